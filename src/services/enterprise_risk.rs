//! Supplier breakdown of enterprise risk: who the flagged providers are for
//! one analysis, and how the enterprise fared across every analysis.

use bson::{doc, oid::ObjectId, Document};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};

use crate::api::format::{bson_to_json, document_to_json};
use crate::config::QueryConfig;
use crate::database::models::{collections, get_string, DeforestationType, EnterpriseRisk, FarmRisk, Period};
use crate::database::reference::{ref_in, resolve_field, validate_ids};
use crate::database::{Batcher, DocumentStore, FindQuery};
use crate::services::periods::Selector;
use crate::services::risk::{at, AggregateError, RiskAggregator};

const ENTERPRISE_FIELDS: [&str; 6] = ["adm2_id", "name", "ext_id", "type_enterprise", "latitude", "longitud"];
const FARM_FIELDS: [&str; 3] = ["adm3_id", "ext_id", "farm_source"];
const POLYGON_FIELDS: [&str; 6] = ["farm_id", "geojson", "latitude", "longitud", "farm_ha", "radio"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct Providers {
    pub inputs: Vec<Value>,
    pub outputs: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub period: Period,
    pub providers: Providers,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    pub annual: Vec<HistoryItem>,
    pub cumulative: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedRef {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnterpriseDetails {
    pub id: String,
    pub name: Option<String>,
    pub latitude: Value,
    pub longitud: Value,
    pub ext_id: Value,
    pub type_enterprise: Value,
    pub adm2_id: Option<String>,
    pub adm2: Option<NamedRef>,
    pub adm1: Option<NamedRef>,
    pub providers: Providers,
    pub history: History,
}

/// Lookup tables shared by the current view and the history.
struct Joined {
    farmrisks: HashMap<ObjectId, Document>,
    farms: HashMap<ObjectId, Document>,
    polygons: HashMap<ObjectId, Document>,
}

impl Joined {
    fn providers<'r>(&self, rows: impl IntoIterator<Item = &'r EnterpriseRisk>, with_polygons: bool) -> Providers {
        let mut out = Providers::default();
        for row in rows {
            out.inputs.extend(row.risk_input.iter().filter_map(|id| self.provider(*id, with_polygons)));
            out.outputs.extend(row.risk_output.iter().filter_map(|id| self.provider(*id, with_polygons)));
        }
        out
    }

    /// The farm behind one FarmRisk row with the row and its polygon attached.
    /// Dangling FarmRisk references are skipped.
    fn provider(&self, farmrisk: ObjectId, with_polygon: bool) -> Option<Value> {
        let risk = self.farmrisks.get(&farmrisk)?;
        let farm_id = resolve_field(risk, "farm_id");

        let mut payload = match farm_id.and_then(|id| self.farms.get(&id)) {
            Some(farm) => document_to_json(farm),
            None => json!({ "id": farm_id.map(|id| id.to_hex()) }),
        };
        let polygon = resolve_field(risk, "farm_polygons_id")
            .filter(|_| with_polygon)
            .and_then(|id| self.polygons.get(&id))
            .map(|p| {
                let mut p = p.clone();
                p.remove("_id");
                document_to_json(&p)
            })
            .unwrap_or(Value::Null);

        if let Value::Object(map) = &mut payload {
            map.insert("farm_polygon".into(), polygon);
            map.insert("risk".into(), document_to_json(risk));
        }
        Some(payload)
    }
}

pub struct EnterpriseRiskService<'a> {
    aggregator: RiskAggregator<'a>,
    max_ids: usize,
}

impl<'a> EnterpriseRiskService<'a> {
    pub fn new(store: &'a dyn DocumentStore, query: &QueryConfig) -> Self {
        Self {
            aggregator: RiskAggregator::new(store, query),
            max_ids: query.max_ids,
        }
    }

    fn batcher(&self) -> &Batcher<'a> {
        self.aggregator.batcher()
    }

    /// Details for `enterprise_ids`, or for every enterprise with a risk row
    /// in the analysis when the list is empty.
    pub async fn details(&self, analysis_id: &str, enterprise_ids: &[String]) -> Result<Vec<EnterpriseDetails>, AggregateError> {
        let analysis = validate_ids(&[analysis_id], "analysis_id", 1, false)?[0];
        let mut enterprises = validate_ids(enterprise_ids, "enterprise_ids", self.max_ids, true)?;

        if enterprises.is_empty() {
            let query = FindQuery::new(ref_in("analysis_id", &[analysis]))
                .project(&["enterprise_id"])
                .sort(doc! { "_id": 1 });
            let current = self
                .batcher()
                .store()
                .find(collections::ENTERPRISE_RISK, query)
                .await
                .map_err(at("enterpriserisk"))?;
            let mut seen = BTreeSet::new();
            enterprises = current
                .iter()
                .filter_map(|d| resolve_field(d, "enterprise_id"))
                .filter(|id| seen.insert(*id))
                .collect();
        }
        if enterprises.is_empty() {
            return Ok(Vec::new());
        }

        // Every analysis of these enterprises; the requested one is a subset.
        let rows: Vec<EnterpriseRisk> = self
            .batcher()
            .fetch_by(collections::ENTERPRISE_RISK, "enterprise_id", &enterprises, &EnterpriseRisk::FIELDS)
            .await
            .map_err(at("enterpriserisk"))?
            .iter()
            .filter_map(EnterpriseRisk::from_document)
            .collect();

        let joined = self.join(&rows, analysis).await?;

        let history_analyses: Vec<ObjectId> = distinct(rows.iter().filter_map(|r| r.analysis_id));
        let periods = if history_analyses.is_empty() {
            Default::default()
        } else {
            self.aggregator.resolve(&Selector::Analyses(history_analyses)).await?
        };

        let meta = self
            .batcher()
            .fetch(collections::ENTERPRISE, &enterprises, &ENTERPRISE_FIELDS)
            .await
            .map_err(at("enterprise"))?;
        let adm2_ids = distinct(meta.values().filter_map(|d| resolve_field(d, "adm2_id")));
        let adm2 = self
            .batcher()
            .fetch(collections::ADM2, &adm2_ids, &["name", "adm1_id"])
            .await
            .map_err(at("adm2"))?;
        let adm1_ids = distinct(adm2.values().filter_map(|d| resolve_field(d, "adm1_id")));
        let adm1 = self
            .batcher()
            .fetch(collections::ADM1, &adm1_ids, &["name"])
            .await
            .map_err(at("adm1"))?;

        let mut out = Vec::with_capacity(enterprises.len());
        for enterprise in &enterprises {
            let Some(doc) = meta.get(enterprise) else { continue };
            let own: Vec<&EnterpriseRisk> = rows.iter().filter(|r| r.enterprise_id == Some(*enterprise)).collect();

            let current = own.iter().copied().filter(|r| r.analysis_id == Some(analysis));
            let providers = joined.providers(current, true);

            let mut history = History::default();
            for row in &own {
                let Some(defo) = row.analysis_id.and_then(|a| periods.deforestation_of(a)) else { continue };
                let kind = periods
                    .deforestations
                    .get(&defo)
                    .and_then(|d| d.kind.as_deref())
                    .and_then(|k| k.parse::<DeforestationType>().ok());
                let item = HistoryItem {
                    period: periods.period(defo),
                    providers: joined.providers([*row], false),
                };
                match kind {
                    Some(DeforestationType::Annual) => history.annual.push(item),
                    Some(DeforestationType::Cumulative) => history.cumulative.push(item),
                    _ => {}
                }
            }
            history.annual.sort_by_key(|i| i.period.start);
            history.cumulative.sort_by_key(|i| i.period.start);

            let adm2_id = resolve_field(doc, "adm2_id");
            let adm2_doc = adm2_id.and_then(|id| adm2.get(&id));
            let adm1_id = adm2_doc.and_then(|d| resolve_field(d, "adm1_id"));
            let adm1_doc = adm1_id.and_then(|id| adm1.get(&id));

            out.push(EnterpriseDetails {
                id: enterprise.to_hex(),
                name: get_string(doc, "name"),
                latitude: field(doc, "latitude"),
                longitud: field(doc, "longitud"),
                ext_id: field(doc, "ext_id"),
                type_enterprise: field(doc, "type_enterprise"),
                adm2_id: adm2_id.map(|id| id.to_hex()),
                adm2: adm2_id.zip(adm2_doc).map(|(id, d)| NamedRef {
                    id: id.to_hex(),
                    name: get_string(d, "name"),
                }),
                adm1: adm1_id.zip(adm1_doc).map(|(id, d)| NamedRef {
                    id: id.to_hex(),
                    name: get_string(d, "name"),
                }),
                providers,
                history,
            });
        }
        Ok(out)
    }

    async fn join(&self, rows: &[EnterpriseRisk], analysis: ObjectId) -> Result<Joined, AggregateError> {
        let farmrisk_ids = distinct(
            rows.iter()
                .flat_map(|r| r.risk_input.iter().chain(r.risk_output.iter()).copied()),
        );
        let farmrisks = self
            .batcher()
            .fetch(collections::FARM_RISK, &farmrisk_ids, &FarmRisk::FIELDS)
            .await
            .map_err(at("farmrisk"))?;

        let farm_ids = distinct(farmrisks.values().filter_map(|d| resolve_field(d, "farm_id")));
        let farms = self
            .batcher()
            .fetch(collections::FARM, &farm_ids, &FARM_FIELDS)
            .await
            .map_err(at("farms"))?;

        // Polygons are only shown for the requested analysis.
        let current: BTreeSet<ObjectId> = rows
            .iter()
            .filter(|r| r.analysis_id == Some(analysis))
            .flat_map(|r| r.risk_input.iter().chain(r.risk_output.iter()).copied())
            .collect();
        let polygon_ids = distinct(
            current
                .iter()
                .filter_map(|id| farmrisks.get(id))
                .filter_map(|d| resolve_field(d, "farm_polygons_id")),
        );
        let polygons = self
            .batcher()
            .fetch(collections::FARM_POLYGONS, &polygon_ids, &POLYGON_FIELDS)
            .await
            .map_err(at("farmpolygons"))?;

        Ok(Joined { farmrisks, farms, polygons })
    }
}

fn field(doc: &Document, key: &str) -> Value {
    doc.get(key).map(bson_to_json).unwrap_or(Value::Null)
}

fn distinct(ids: impl Iterator<Item = ObjectId>) -> Vec<ObjectId> {
    let mut seen = BTreeSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    struct Fixture {
        store: MemoryStore,
        enterprise: ObjectId,
        current: ObjectId,
        farm: ObjectId,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let adm1 = store.insert(collections::ADM1, doc! { "name": "Antioquia" });
        let adm2 = store.insert(collections::ADM2, doc! { "name": "Medellín", "adm1_id": adm1 });
        let enterprise = store.insert(collections::ENTERPRISE, doc! { "name": "Frigorífico", "adm2_id": adm2, "type_enterprise": "SLAUGHTERHOUSE" });

        let old_defo = store.insert(collections::DEFORESTATION, doc! { "deforestation_type": "annual", "year_start": 2018, "year_end": 2018 });
        let new_defo = store.insert(collections::DEFORESTATION, doc! { "deforestation_type": "annual", "year_start": 2021, "year_end": 2021 });
        let past = store.insert(collections::ANALYSIS, doc! { "deforestation_id": old_defo });
        let current = store.insert(collections::ANALYSIS, doc! { "deforestation_id": new_defo });

        let farm = store.insert(collections::FARM, doc! { "ext_id": [{ "source": "SIT_CODE", "ext_code": "0501" }] });
        let polygon = store.insert(collections::FARM_POLYGONS, doc! { "farm_id": farm, "farm_ha": 12.0 });
        let fr_now = store.insert(collections::FARM_RISK, doc! { "farm_id": farm, "analysis_id": current, "farm_polygons_id": polygon, "risk_direct": true });
        let fr_then = store.insert(collections::FARM_RISK, doc! { "farm_id": farm, "analysis_id": past });

        store.insert(collections::ENTERPRISE_RISK, doc! { "enterprise_id": enterprise, "analysis_id": current, "risk_input": [fr_now], "risk_output": [] });
        store.insert(collections::ENTERPRISE_RISK, doc! { "enterprise_id": enterprise, "analysis_id": past, "risk_input": [], "risk_output": [fr_then] });

        Fixture { store, enterprise, current, farm }
    }

    #[tokio::test]
    async fn current_providers_and_history() {
        let f = fixture();
        let service = EnterpriseRiskService::new(&f.store, &QueryConfig::default());
        let out = service.details(&f.current.to_hex(), &[f.enterprise.to_hex()]).await.unwrap();

        assert_eq!(out.len(), 1);
        let details = &out[0];
        assert_eq!(details.adm2.as_ref().and_then(|a| a.name.as_deref()), Some("Medellín"));
        assert_eq!(details.adm1.as_ref().and_then(|a| a.name.as_deref()), Some("Antioquia"));

        assert_eq!(details.providers.inputs.len(), 1);
        assert!(details.providers.outputs.is_empty());
        let provider = &details.providers.inputs[0];
        assert_eq!(provider["id"], Value::from(f.farm.to_hex()));
        assert_eq!(provider["farm_polygon"]["farm_ha"], Value::from(12.0));
        assert_eq!(provider["risk"]["risk_direct"], Value::from(true));

        // oldest period first
        assert_eq!(details.history.annual.len(), 2);
        assert_eq!(details.history.annual[0].providers.outputs.len(), 1);
        assert!(details.history.annual[0].providers.outputs[0]["farm_polygon"].is_null());
        assert!(details.history.cumulative.is_empty());
    }

    #[tokio::test]
    async fn empty_list_means_every_enterprise_of_the_analysis() {
        let f = fixture();
        let service = EnterpriseRiskService::new(&f.store, &QueryConfig::default());
        let out = service.details(&f.current.to_hex(), &[]).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, f.enterprise.to_hex());
    }

    #[tokio::test]
    async fn analysis_id_must_parse() {
        let f = fixture();
        let service = EnterpriseRiskService::new(&f.store, &QueryConfig::default());
        assert!(matches!(service.details("bad", &[]).await, Err(AggregateError::Ids(_))));
    }
}
