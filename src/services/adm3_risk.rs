use bson::oid::ObjectId;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::database::models::{collections, Adm3, DeforestationType, Period};
use crate::database::reference::validate_ids;
use crate::database::{Batcher, DocumentStore};
use crate::config::QueryConfig;
use crate::services::label::split_label;
use crate::services::periods::Selector;
use crate::services::risk::{newest_first, Adm3Inputs, Adm3Totals, AggregateError, RiskAggregator};

/// One adm3 within one analysis.
#[derive(Debug, Clone, Serialize)]
pub struct Adm3AnalysisRow {
    pub analysis_id: String,
    pub adm3_id: String,
    #[serde(flatten)]
    pub period: Period,
    pub risk_total: bool,
    pub farm_amount: i64,
    pub def_ha: f64,
    pub farms_at_risk: usize,
    pub farm_def_ha: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Adm3TypeItem {
    pub analysis_id: String,
    pub deforestation_id: String,
    #[serde(flatten)]
    pub period: Period,
    pub def_ha: f64,
    pub farm_amount: i64,
    pub risk_total: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Adm3TypeGroup {
    pub adm3_id: String,
    pub name: Option<String>,
    pub department: Option<String>,
    pub municipality: Option<String>,
    pub items: Vec<Adm3TypeItem>,
}

pub struct Adm3RiskService<'a> {
    aggregator: RiskAggregator<'a>,
    max_ids: usize,
}

impl<'a> Adm3RiskService<'a> {
    pub fn new(store: &'a dyn DocumentStore, query: &QueryConfig) -> Self {
        Self {
            aggregator: RiskAggregator::new(store, query),
            max_ids: query.max_ids,
        }
    }

    fn batcher(&self) -> &Batcher<'a> {
        self.aggregator.batcher()
    }

    /// Rows keyed by analysis id. Every requested analysis gets a key; each
    /// analysis that exists gets one row per requested adm3, zero-filled when
    /// no Adm3Risk row matches.
    pub async fn by_analysis_and_adm3(
        &self,
        analysis_ids: &[String],
        adm3_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Adm3AnalysisRow>>, AggregateError> {
        let analyses = validate_ids(analysis_ids, "analysis_ids", self.max_ids, false)?;
        let adm3s = validate_ids(adm3_ids, "adm3_ids", self.max_ids, false)?;

        let mut out: BTreeMap<String, Vec<Adm3AnalysisRow>> =
            analyses.iter().map(|a| (a.to_hex(), Vec::new())).collect();

        let periods = self.aggregator.resolve(&Selector::Analyses(analyses)).await?;
        let found = periods.found_analyses();
        if found.is_empty() {
            return Ok(out);
        }

        let inputs = Adm3Inputs::load(self.batcher(), &adm3s, found).await?;
        let totals = inputs.fold(Some);

        for analysis in found {
            let period = periods.period_of_analysis(*analysis);
            let rows = adm3s
                .iter()
                .map(|adm3| {
                    let t = totals.get(&(*adm3, *analysis)).cloned().unwrap_or_default();
                    analysis_row(*analysis, *adm3, period, t)
                })
                .collect();
            out.insert(analysis.to_hex(), rows);
        }
        Ok(out)
    }

    /// Groups keyed by adm3 id, each with one item per analysis of the
    /// requested deforestation type, newest period first.
    pub async fn by_adm3_and_type(
        &self,
        adm3_ids: &[String],
        kind: DeforestationType,
    ) -> Result<BTreeMap<String, Adm3TypeGroup>, AggregateError> {
        let adm3s = validate_ids(adm3_ids, "adm3_ids", self.max_ids, false)?;

        let metadata = self
            .batcher()
            .fetch(collections::ADM3, &adm3s, &Adm3::FIELDS)
            .await
            .map_err(|source| AggregateError::Store { stage: "adm3", source })?;

        let mut out: BTreeMap<String, Adm3TypeGroup> = adm3s
            .iter()
            .map(|id| {
                let adm3 = metadata.get(id).and_then(Adm3::from_document);
                let label = split_label(adm3.as_ref().and_then(|a| a.label.as_deref()));
                let group = Adm3TypeGroup {
                    adm3_id: id.to_hex(),
                    name: adm3.and_then(|a| a.name),
                    department: label.department,
                    municipality: label.municipality,
                    items: Vec::new(),
                };
                (id.to_hex(), group)
            })
            .collect();

        let periods = self.aggregator.resolve(&Selector::Type(kind)).await?;
        if periods.is_empty() {
            return Ok(out);
        }

        let inputs = Adm3Inputs::load(self.batcher(), &adm3s, periods.analysis_ids()).await?;
        let totals = inputs.fold(Some);

        for adm3 in &adm3s {
            let mut items: Vec<Adm3TypeItem> = periods
                .analysis_ids()
                .iter()
                .filter_map(|analysis| {
                    let defo = periods.deforestation_of(*analysis)?;
                    let t = totals.get(&(*adm3, *analysis)).cloned().unwrap_or_default();
                    Some(Adm3TypeItem {
                        analysis_id: analysis.to_hex(),
                        deforestation_id: defo.to_hex(),
                        period: periods.period(defo),
                        def_ha: t.def_ha,
                        farm_amount: t.farm_amount,
                        risk_total: t.risk_total,
                    })
                })
                .collect();
            newest_first(&mut items, |item| item.period.end);

            if let Some(group) = out.get_mut(&adm3.to_hex()) {
                group.items = items;
            }
        }
        Ok(out)
    }
}

fn analysis_row(analysis: ObjectId, adm3: ObjectId, period: Period, t: Adm3Totals) -> Adm3AnalysisRow {
    Adm3AnalysisRow {
        analysis_id: analysis.to_hex(),
        adm3_id: adm3.to_hex(),
        period,
        risk_total: t.risk_total,
        farm_amount: t.farm_amount,
        def_ha: t.def_ha,
        farms_at_risk: t.flagged_farms.len(),
        farm_def_ha: t.farm_def_ha(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::reference::IdError;
    use crate::database::MemoryStore;
    use bson::doc;

    struct Fixture {
        store: MemoryStore,
        x: ObjectId,
        y: ObjectId,
        analysis: ObjectId,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let x = store.insert(collections::ADM3, doc! { "name": "La Zona", "label": "Antioquia, Medellín, La Zona" });
        let y = store.insert(collections::ADM3, doc! { "name": "Otra" });
        let defo = store.insert(collections::DEFORESTATION, doc! {
            "deforestation_type": "cumulative",
            "period_start": "2000-01-01T00:00:00",
            "period_end": "2020-12-31T23:59:59",
        });
        let analysis = store.insert(collections::ANALYSIS, doc! { "deforestation_id": defo });
        store.insert(collections::ADM3_RISK, doc! { "adm3_id": x, "analysis_id": analysis, "def_ha": 4.25, "farm_amount": 3 });
        let farm = store.insert(collections::FARM, doc! { "adm3_id": x });
        store.insert(collections::FARM_RISK, doc! { "farm_id": farm, "analysis_id": analysis, "risk_output": true });
        Fixture { store, x, y, analysis }
    }

    #[tokio::test]
    async fn rows_for_every_requested_adm3() {
        let f = fixture();
        let service = Adm3RiskService::new(&f.store, &QueryConfig::default());
        let out = service
            .by_analysis_and_adm3(&[f.analysis.to_hex()], &[f.x.to_hex(), f.y.to_hex()])
            .await
            .unwrap();

        let rows = &out[&f.analysis.to_hex()];
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].adm3_id, f.x.to_hex());
        assert!(rows[0].risk_total);
        assert_eq!(rows[0].farm_amount, 3);
        assert_eq!(rows[0].def_ha, 4.25);

        assert_eq!(rows[1].adm3_id, f.y.to_hex());
        assert!(!rows[1].risk_total);
        assert_eq!(rows[1].farm_amount, 0);
        assert_eq!(rows[1].def_ha, 0.0);
    }

    #[tokio::test]
    async fn unknown_analysis_keeps_an_empty_key() {
        let f = fixture();
        let service = Adm3RiskService::new(&f.store, &QueryConfig::default());
        let missing = ObjectId::new().to_hex();
        let out = service.by_analysis_and_adm3(&[missing.clone()], &[f.x.to_hex()]).await.unwrap();
        assert!(out[&missing].is_empty());
    }

    #[tokio::test]
    async fn both_lists_are_required() {
        let f = fixture();
        let service = Adm3RiskService::new(&f.store, &QueryConfig::default());
        let err = service.by_analysis_and_adm3(&[f.analysis.to_hex()], &[] as &[String]).await.unwrap_err();
        assert!(matches!(err, AggregateError::Ids(IdError::Empty { .. })));
    }

    #[tokio::test]
    async fn grouped_by_type_with_label_parts() {
        let f = fixture();
        let service = Adm3RiskService::new(&f.store, &QueryConfig::default());
        let out = service
            .by_adm3_and_type(&[f.x.to_hex(), f.y.to_hex()], DeforestationType::Cumulative)
            .await
            .unwrap();

        let x = &out[&f.x.to_hex()];
        assert_eq!(x.name.as_deref(), Some("La Zona"));
        assert_eq!(x.department.as_deref(), Some("Antioquia"));
        assert_eq!(x.municipality.as_deref(), Some("Medellín"));
        assert_eq!(x.items.len(), 1);
        assert_eq!(x.items[0].analysis_id, f.analysis.to_hex());
        assert!(x.items[0].risk_total);

        let y = &out[&f.y.to_hex()];
        assert!(y.department.is_none());
        assert_eq!(y.items[0].farm_amount, 0);
    }

    #[tokio::test]
    async fn type_without_deforestations_keeps_groups() {
        let f = fixture();
        let service = Adm3RiskService::new(&f.store, &QueryConfig::default());
        let out = service.by_adm3_and_type(&[f.x.to_hex()], DeforestationType::Warning).await.unwrap();
        assert!(out[&f.x.to_hex()].items.is_empty());
    }
}
