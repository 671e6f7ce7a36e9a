use bson::{oid::ObjectId, Document};
use serde::Serialize;

use super::{get_document, get_f64, get_flag, get_i64};
use crate::database::reference::{resolve_field, resolve_list};

/// One overlap measurement of a farm polygon against a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AreaMeasure {
    pub prop: f64,
    pub ha: f64,
    pub distance: f64,
}

impl AreaMeasure {
    pub fn from_document(doc: &Document, key: &str) -> Self {
        get_document(doc, key)
            .map(|m| Self {
                prop: get_f64(m, "prop").unwrap_or(0.0),
                ha: get_f64(m, "ha").unwrap_or(0.0),
                distance: get_f64(m, "distance").unwrap_or(0.0),
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct FarmRisk {
    pub id: ObjectId,
    pub farm_id: Option<ObjectId>,
    pub analysis_id: Option<ObjectId>,
    pub farm_polygons_id: Option<ObjectId>,
    pub deforestation: AreaMeasure,
    pub protected: AreaMeasure,
    pub farming_in: AreaMeasure,
    pub farming_out: AreaMeasure,
    pub risk_direct: bool,
    pub risk_input: bool,
    pub risk_output: bool,
}

impl FarmRisk {
    pub const FIELDS: [&'static str; 11] = [
        "farm_id",
        "analysis_id",
        "farm_polygons_id",
        "deforestation",
        "protected",
        "farming_in",
        "farming_out",
        "risk_direct",
        "risk_input",
        "risk_output",
        "_id",
    ];

    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: resolve_field(doc, "_id")?,
            farm_id: resolve_field(doc, "farm_id"),
            analysis_id: resolve_field(doc, "analysis_id"),
            farm_polygons_id: resolve_field(doc, "farm_polygons_id"),
            deforestation: AreaMeasure::from_document(doc, "deforestation"),
            protected: AreaMeasure::from_document(doc, "protected"),
            farming_in: AreaMeasure::from_document(doc, "farming_in"),
            farming_out: AreaMeasure::from_document(doc, "farming_out"),
            risk_direct: get_flag(doc, "risk_direct"),
            risk_input: get_flag(doc, "risk_input"),
            risk_output: get_flag(doc, "risk_output"),
        })
    }

    pub fn any_flag(&self) -> bool {
        self.risk_direct || self.risk_input || self.risk_output
    }
}

/// Precomputed per (adm3, analysis) rollup written upstream.
#[derive(Debug, Clone)]
pub struct Adm3Risk {
    pub id: ObjectId,
    pub adm3_id: Option<ObjectId>,
    pub analysis_id: Option<ObjectId>,
    pub def_ha: f64,
    pub farm_amount: i64,
    pub risk_total: bool,
}

impl Adm3Risk {
    pub const FIELDS: [&'static str; 5] = ["adm3_id", "analysis_id", "def_ha", "farm_amount", "risk_total"];

    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: resolve_field(doc, "_id")?,
            adm3_id: resolve_field(doc, "adm3_id"),
            analysis_id: resolve_field(doc, "analysis_id"),
            def_ha: get_f64(doc, "def_ha").unwrap_or(0.0).max(0.0),
            farm_amount: get_i64(doc, "farm_amount").unwrap_or(0).max(0),
            risk_total: get_flag(doc, "risk_total"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct EnterpriseRisk {
    pub id: ObjectId,
    pub enterprise_id: Option<ObjectId>,
    pub analysis_id: Option<ObjectId>,
    pub risk_input: Vec<ObjectId>,
    pub risk_output: Vec<ObjectId>,
}

impl EnterpriseRisk {
    pub const FIELDS: [&'static str; 4] = ["enterprise_id", "analysis_id", "risk_input", "risk_output"];

    pub fn from_document(doc: &Document) -> Option<Self> {
        Some(Self {
            id: resolve_field(doc, "_id")?,
            enterprise_id: resolve_field(doc, "enterprise_id"),
            analysis_id: resolve_field(doc, "analysis_id"),
            risk_input: resolve_list(doc, "risk_input"),
            risk_output: resolve_list(doc, "risk_output"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn farm_risk_defaults_missing_measures() {
        let row = FarmRisk::from_document(&doc! {
            "_id": ObjectId::new(),
            "deforestation": { "prop": 0.5, "ha": 12.0, "distance": 0 },
            "risk_input": true,
        })
        .unwrap();
        assert_eq!(row.deforestation.ha, 12.0);
        assert_eq!(row.protected, AreaMeasure::default());
        assert!(row.any_flag());
        assert!(!row.risk_direct);
    }

    #[test]
    fn adm3_risk_never_negative() {
        let row = Adm3Risk::from_document(&doc! { "_id": ObjectId::new(), "def_ha": -1.0, "farm_amount": -3 }).unwrap();
        assert_eq!(row.def_ha, 0.0);
        assert_eq!(row.farm_amount, 0);
    }
}
