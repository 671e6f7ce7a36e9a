use axum::Router;
use bson::Document;
use serde_json::Value;

use super::readonly::{self, CollectionSpec, ExtIdSearch, ParentFilter};
use crate::api::format::document_to_json;
use crate::database::models::deforestation::format_timestamp;
use crate::database::models::{collections, Period};
use crate::enums::{LABEL, SOURCE};
use crate::state::AppState;

const ADM1: CollectionSpec = CollectionSpec {
    fields: &["name", "ext_id"],
    by_name: true,
    ext_id: Some(ExtIdSearch::Plain),
    ..CollectionSpec::new(collections::ADM1)
};

const ADM2: CollectionSpec = CollectionSpec {
    fields: &["name", "ext_id"],
    by_name: true,
    parents: &[ParentFilter { route: "by-adm1", field: "adm1_id" }],
    ..CollectionSpec::new(collections::ADM2)
};

const ADM3: CollectionSpec = CollectionSpec {
    fields: &["name", "ext_id"],
    by_name: true,
    parents: &[ParentFilter { route: "by-adm2", field: "adm2_id" }],
    ..CollectionSpec::new(collections::ADM3)
};

const FARM: CollectionSpec = CollectionSpec {
    fields: &["farm_source"],
    ext_id: Some(ExtIdSearch::Structured { label_field: "source", labels: &SOURCE }),
    parents: &[ParentFilter { route: "by-adm3", field: "adm3_id" }],
    ..CollectionSpec::new(collections::FARM)
};

const FARM_POLYGONS: CollectionSpec = CollectionSpec {
    parents: &[ParentFilter { route: "by-farm", field: "farm_id" }],
    ..CollectionSpec::new(collections::FARM_POLYGONS)
};

const ENTERPRISE: CollectionSpec = CollectionSpec {
    fields: &["name", "type_enterprise"],
    by_name: true,
    ext_id: Some(ExtIdSearch::Structured { label_field: "label", labels: &LABEL }),
    parents: &[ParentFilter { route: "by-adm2", field: "adm2_id" }],
    ..CollectionSpec::new(collections::ENTERPRISE)
};

const SUPPLIERS: CollectionSpec = CollectionSpec {
    parents: &[
        ParentFilter { route: "by-enterprise", field: "enterprise_id" },
        ParentFilter { route: "by-farm", field: "farm_id" },
    ],
    ..CollectionSpec::new(collections::SUPPLIERS)
};

const DEFORESTATION: CollectionSpec = CollectionSpec {
    fields: &["deforestation_source", "deforestation_type", "name"],
    by_name: true,
    admin_only: true,
    render: render_deforestation,
    ..CollectionSpec::new(collections::DEFORESTATION)
};

const PROTECTED_AREAS: CollectionSpec = CollectionSpec {
    fields: &["name"],
    by_name: true,
    ..CollectionSpec::new(collections::PROTECTED_AREAS)
};

const FARMING_AREAS: CollectionSpec = CollectionSpec {
    fields: &["name"],
    by_name: true,
    ..CollectionSpec::new(collections::FARMING_AREAS)
};

const ANALYSIS: CollectionSpec = CollectionSpec::new(collections::ANALYSIS);

const ADM3_RISK: CollectionSpec = CollectionSpec {
    fields: &["adm3_id", "analysis_id"],
    ..CollectionSpec::new(collections::ADM3_RISK)
};

const FARM_RISK: CollectionSpec = CollectionSpec {
    fields: &["farm_id", "analysis_id", "risk_direct", "risk_input", "risk_output"],
    ..CollectionSpec::new(collections::FARM_RISK)
};

const ENTERPRISE_RISK: CollectionSpec = CollectionSpec {
    fields: &["enterprise_id", "analysis_id"],
    ..CollectionSpec::new(collections::ENTERPRISE_RISK)
};

const MOVEMENT: CollectionSpec = CollectionSpec {
    fields: &["ext_id", "species", "type_origin", "type_destination"],
    ext_id: Some(ExtIdSearch::Plain),
    ..CollectionSpec::new(collections::MOVEMENT)
};

pub static SPECS: [CollectionSpec; 15] = [
    ADM1,
    ADM2,
    ADM3,
    FARM,
    FARM_POLYGONS,
    ENTERPRISE,
    SUPPLIERS,
    DEFORESTATION,
    PROTECTED_AREAS,
    FARMING_AREAS,
    ANALYSIS,
    ADM3_RISK,
    FARM_RISK,
    ENTERPRISE_RISK,
    MOVEMENT,
];

/// Deforestation rows always carry `period_start`/`period_end`, synthesized
/// from the legacy year pair when absent.
pub fn render_deforestation(doc: &Document) -> Value {
    let mut value = document_to_json(doc);
    let period = Period::from_document(doc);
    if let Value::Object(map) = &mut value {
        for (key, ts) in [("period_start", period.start), ("period_end", period.end)] {
            map.insert(key.to_string(), ts.map(|t| Value::String(format_timestamp(&t))).unwrap_or(Value::Null));
        }
    }
    value
}

pub fn router(state: &AppState) -> Router<AppState> {
    SPECS
        .iter()
        .fold(Router::new(), |app, spec| app.merge(readonly::router(spec, state)))
}
