//! Per-entity, per-period risk rollups.
//!
//! Every request runs the same sequential pipeline: validate ids, resolve
//! periods, pre-seed one bucket per requested entity, batch-fetch the join
//! path for the scope, fold rows into (entity, deforestation) accumulators and
//! emit items newest-first. Any store failure aborts the whole request; a
//! partial rollup would understate risk.

use bson::oid::ObjectId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::QueryConfig;
use crate::database::models::{collections, Adm3Risk, AreaMeasure, EnterpriseRisk, Farm, FarmRisk, Period};
use crate::database::reference::{ref_in, resolve_field, validate_ids, IdError};
use crate::database::{Batcher, DatabaseError, DocumentStore};
use crate::error::ApiError;
use crate::filter::FilterError;
use crate::services::periods::{resolve_periods, ResolvedPeriods, Selector, SelectorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Adm3,
    Farm,
    Enterprise,
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adm3" => Ok(EntityType::Adm3),
            "farm" => Ok(EntityType::Farm),
            "enterprise" => Ok(EntityType::Enterprise),
            _ => Err(format!("Invalid entity_type '{}'. Allowed: adm3, farm, enterprise", s)),
        }
    }
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Ids(#[from] IdError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Paging(#[from] FilterError),

    #[error("{stage} lookup failed: {source}")]
    Store {
        stage: &'static str,
        #[source]
        source: DatabaseError,
    },
}

pub(crate) fn at(stage: &'static str) -> impl FnOnce(DatabaseError) -> AggregateError {
    move |source| AggregateError::Store { stage, source }
}

impl From<AggregateError> for ApiError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::Ids(e) => ApiError::bad_request(e.to_string()),
            AggregateError::Selector(e) => ApiError::bad_request(e.to_string()),
            AggregateError::Paging(e) => ApiError::bad_request(e.to_string()),
            AggregateError::Store { stage, source } => {
                error!(stage, error = %source, "risk aggregation failed");
                if source.is_connectivity() {
                    ApiError::service_unavailable("Database temporarily unavailable")
                } else {
                    ApiError::internal_server_error("Internal server error")
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityRiskView {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub items: Vec<PeriodItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodItem {
    pub deforestation_id: String,
    pub analysis_ids: Vec<String>,
    #[serde(flatten)]
    pub period: Period,
    #[serde(flatten)]
    pub detail: RiskDetail,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RiskDetail {
    Adm3(Adm3Detail),
    Farm(FarmDetail),
    Enterprise(EnterpriseDetail),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SitCodes {
    pub direct: BTreeSet<String>,
    pub input: BTreeSet<String>,
    pub output: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowSitCodes {
    pub input: BTreeSet<String>,
    pub output: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Adm3Detail {
    pub risk_total: bool,
    pub farm_amount: i64,
    pub def_ha: f64,
    pub farms_at_risk: usize,
    pub farm_def_ha: f64,
    pub sit_codes: SitCodes,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FarmDetail {
    pub farmrisk_id: Option<String>,
    pub risk_direct: bool,
    pub risk_input: bool,
    pub risk_output: bool,
    pub deforestation: AreaMeasure,
    pub protected: AreaMeasure,
    pub farming_in: AreaMeasure,
    pub farming_out: AreaMeasure,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnterpriseDetail {
    pub risk_total: bool,
    pub risk_input: Vec<String>,
    pub risk_output: Vec<String>,
    pub sit_codes: FlowSitCodes,
}

/// Running totals for one Adm3 within one bucket.
#[derive(Debug, Clone, Default)]
pub struct Adm3Totals {
    pub risk_total: bool,
    pub farm_amount: i64,
    pub def_ha: f64,
    /// Flagged farms with the deforestation hectares of their first row.
    pub flagged_farms: BTreeMap<ObjectId, f64>,
    pub sit_codes: SitCodes,
}

impl Adm3Totals {
    pub fn farm_def_ha(&self) -> f64 {
        self.flagged_farms.values().sum()
    }
}

impl From<Adm3Totals> for Adm3Detail {
    fn from(t: Adm3Totals) -> Self {
        Self {
            risk_total: t.risk_total,
            farm_amount: t.farm_amount,
            def_ha: t.def_ha,
            farms_at_risk: t.flagged_farms.len(),
            farm_def_ha: t.farm_def_ha(),
            sit_codes: t.sit_codes,
        }
    }
}

/// Rows needed to roll Adm3 risk up: precomputed Adm3Risk, the farms of
/// those regions and their FarmRisk rows.
pub struct Adm3Inputs {
    pub adm3risks: Vec<Adm3Risk>,
    pub farms: HashMap<ObjectId, Farm>,
    pub farmrisks: Vec<FarmRisk>,
}

impl Adm3Inputs {
    pub async fn load(batcher: &Batcher<'_>, adm3_ids: &[ObjectId], analysis_ids: &[ObjectId]) -> Result<Self, AggregateError> {
        let adm3risks = batcher
            .fetch_by_with(
                collections::ADM3_RISK,
                "adm3_id",
                adm3_ids,
                ref_in("analysis_id", analysis_ids),
                &Adm3Risk::FIELDS,
            )
            .await
            .map_err(at("adm3risk"))?
            .iter()
            .filter_map(Adm3Risk::from_document)
            .collect();

        let farms: HashMap<ObjectId, Farm> = batcher
            .fetch_by(collections::FARM, "adm3_id", adm3_ids, &["adm3_id", "ext_id"])
            .await
            .map_err(at("farms"))?
            .iter()
            .filter_map(Farm::from_document)
            .map(|f| (f.id, f))
            .collect();

        let farm_ids: Vec<ObjectId> = {
            let mut ids: Vec<ObjectId> = farms.keys().copied().collect();
            ids.sort_by_key(|id| id.bytes());
            ids
        };
        let farmrisks = batcher
            .fetch_by_with(
                collections::FARM_RISK,
                "farm_id",
                &farm_ids,
                ref_in("analysis_id", analysis_ids),
                &FarmRisk::FIELDS,
            )
            .await
            .map_err(at("farmrisk"))?
            .iter()
            .filter_map(FarmRisk::from_document)
            .collect();

        Ok(Self { adm3risks, farms, farmrisks })
    }

    /// Fold into per-(adm3, key) totals, where `key_of` maps an analysis id to
    /// its bucket key (the analysis itself, or its deforestation).
    ///
    /// Numeric fields come from Adm3Risk, counted once per (adm3, analysis).
    /// `risk_total` is the OR of every farm flag in that Adm3.
    pub fn fold<K: Ord + Copy>(&self, key_of: impl Fn(ObjectId) -> Option<K>) -> BTreeMap<(ObjectId, K), Adm3Totals> {
        let mut acc: BTreeMap<(ObjectId, K), Adm3Totals> = BTreeMap::new();

        let mut counted = BTreeSet::new();
        for row in &self.adm3risks {
            let (Some(adm3), Some(analysis)) = (row.adm3_id, row.analysis_id) else { continue };
            let Some(key) = key_of(analysis) else { continue };
            if !counted.insert((adm3, analysis)) {
                continue;
            }
            let totals = acc.entry((adm3, key)).or_default();
            totals.farm_amount += row.farm_amount;
            totals.def_ha += row.def_ha;
        }

        for row in &self.farmrisks {
            let Some(farm) = row.farm_id.and_then(|id| self.farms.get(&id)) else { continue };
            let Some(adm3) = farm.adm3_id else { continue };
            let Some(key) = row.analysis_id.and_then(&key_of) else { continue };
            if !row.any_flag() {
                continue;
            }

            let totals = acc.entry((adm3, key)).or_default();
            totals.risk_total = true;
            totals.flagged_farms.entry(farm.id).or_insert(row.deforestation.ha);

            let codes: Vec<String> = farm.sit_codes().map(str::to_string).collect();
            if row.risk_direct {
                totals.sit_codes.direct.extend(codes.iter().cloned());
            }
            if row.risk_input {
                totals.sit_codes.input.extend(codes.iter().cloned());
            }
            if row.risk_output {
                totals.sit_codes.output.extend(codes);
            }
        }

        acc
    }
}

pub struct RiskAggregator<'a> {
    batcher: Batcher<'a>,
    max_ids: usize,
}

impl<'a> RiskAggregator<'a> {
    pub fn new(store: &'a dyn DocumentStore, query: &QueryConfig) -> Self {
        Self {
            batcher: Batcher::new(store, query.batch_chunk_size),
            max_ids: query.max_ids,
        }
    }

    pub fn batcher(&self) -> &Batcher<'a> {
        &self.batcher
    }

    pub fn validate(&self, ids: &[String], label: &str) -> Result<Vec<ObjectId>, IdError> {
        validate_ids(ids, label, self.max_ids, false)
    }

    pub async fn resolve(&self, selector: &Selector) -> Result<ResolvedPeriods, AggregateError> {
        resolve_periods(&self.batcher, selector).await.map_err(at("periods"))
    }

    /// One view per requested (deduplicated) id, always present.
    pub async fn aggregate(
        &self,
        entity_type: EntityType,
        entity_ids: &[String],
        selector: &Selector,
    ) -> Result<BTreeMap<String, EntityRiskView>, AggregateError> {
        let ids = self.validate(entity_ids, "ids")?;
        let periods = self.resolve(selector).await?;

        let mut buckets: BTreeMap<String, EntityRiskView> = ids
            .iter()
            .map(|id| {
                let view = EntityRiskView {
                    entity_id: id.to_hex(),
                    entity_type,
                    items: Vec::new(),
                };
                (id.to_hex(), view)
            })
            .collect();

        if periods.is_empty() {
            debug!(?entity_type, "no deforestation matched the selector");
            return Ok(buckets);
        }

        let details: HashMap<(ObjectId, ObjectId), RiskDetail> = match entity_type {
            EntityType::Adm3 => self.adm3_details(&ids, &periods).await?,
            EntityType::Farm => self.farm_details(&ids, &periods).await?,
            EntityType::Enterprise => self.enterprise_details(&ids, &periods).await?,
        };

        for id in &ids {
            let mut items: Vec<PeriodItem> = periods
                .deforestation_order()
                .iter()
                .map(|defo| PeriodItem {
                    deforestation_id: defo.to_hex(),
                    analysis_ids: periods.analyses_of(*defo).iter().map(|id| id.to_hex()).collect(),
                    period: periods.period(*defo),
                    detail: details
                        .get(&(*id, *defo))
                        .cloned()
                        .unwrap_or_else(|| empty_detail(entity_type)),
                })
                .collect();
            sort_newest_first(&mut items);

            if let Some(view) = buckets.get_mut(&id.to_hex()) {
                view.items = items;
            }
        }

        Ok(buckets)
    }

    async fn adm3_details(
        &self,
        ids: &[ObjectId],
        periods: &ResolvedPeriods,
    ) -> Result<HashMap<(ObjectId, ObjectId), RiskDetail>, AggregateError> {
        let inputs = Adm3Inputs::load(&self.batcher, ids, periods.analysis_ids()).await?;
        Ok(inputs
            .fold(|analysis| periods.deforestation_of(analysis))
            .into_iter()
            .map(|(key, totals)| (key, RiskDetail::Adm3(totals.into())))
            .collect())
    }

    async fn farm_details(
        &self,
        ids: &[ObjectId],
        periods: &ResolvedPeriods,
    ) -> Result<HashMap<(ObjectId, ObjectId), RiskDetail>, AggregateError> {
        let rows: Vec<FarmRisk> = self
            .batcher
            .fetch_by_with(
                collections::FARM_RISK,
                "farm_id",
                ids,
                ref_in("analysis_id", periods.analysis_ids()),
                &FarmRisk::FIELDS,
            )
            .await
            .map_err(at("farmrisk"))?
            .iter()
            .filter_map(FarmRisk::from_document)
            .collect();

        let mut out: HashMap<(ObjectId, ObjectId), FarmDetail> = HashMap::new();
        for row in rows {
            let (Some(farm), Some(defo)) = (row.farm_id, row.analysis_id.and_then(|a| periods.deforestation_of(a))) else {
                continue;
            };
            // Rows arrive sorted by id: the first supplies the measurements,
            // flags accumulate across any duplicates.
            let detail = out.entry((farm, defo)).or_insert_with(|| FarmDetail {
                farmrisk_id: Some(row.id.to_hex()),
                deforestation: row.deforestation,
                protected: row.protected,
                farming_in: row.farming_in,
                farming_out: row.farming_out,
                ..Default::default()
            });
            detail.risk_direct |= row.risk_direct;
            detail.risk_input |= row.risk_input;
            detail.risk_output |= row.risk_output;
        }

        Ok(out.into_iter().map(|(k, v)| (k, RiskDetail::Farm(v))).collect())
    }

    async fn enterprise_details(
        &self,
        ids: &[ObjectId],
        periods: &ResolvedPeriods,
    ) -> Result<HashMap<(ObjectId, ObjectId), RiskDetail>, AggregateError> {
        let rows: Vec<EnterpriseRisk> = self
            .batcher
            .fetch_by_with(
                collections::ENTERPRISE_RISK,
                "enterprise_id",
                ids,
                ref_in("analysis_id", periods.analysis_ids()),
                &EnterpriseRisk::FIELDS,
            )
            .await
            .map_err(at("enterpriserisk"))?
            .iter()
            .filter_map(EnterpriseRisk::from_document)
            .collect();

        let farmrisk_ids: Vec<ObjectId> = rows
            .iter()
            .flat_map(|r| r.risk_input.iter().chain(r.risk_output.iter()).copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let farmrisk_to_farm: HashMap<ObjectId, ObjectId> = self
            .batcher
            .fetch(collections::FARM_RISK, &farmrisk_ids, &["farm_id"])
            .await
            .map_err(at("farmrisk"))?
            .into_iter()
            .filter_map(|(id, doc)| Some((id, resolve_field(&doc, "farm_id")?)))
            .collect();

        let farm_ids: Vec<ObjectId> = farmrisk_to_farm
            .values()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let farms: HashMap<ObjectId, Farm> = self
            .batcher
            .fetch(collections::FARM, &farm_ids, &["ext_id"])
            .await
            .map_err(at("farms"))?
            .values()
            .filter_map(Farm::from_document)
            .map(|f| (f.id, f))
            .collect();

        let sit_codes_of = |farmrisk: &ObjectId| -> Vec<String> {
            farmrisk_to_farm
                .get(farmrisk)
                .and_then(|farm| farms.get(farm))
                .map(|farm| farm.sit_codes().map(str::to_string).collect())
                .unwrap_or_default()
        };

        #[derive(Default)]
        struct Acc {
            input: BTreeSet<ObjectId>,
            output: BTreeSet<ObjectId>,
            sit_codes: FlowSitCodes,
        }

        let mut acc: HashMap<(ObjectId, ObjectId), Acc> = HashMap::new();
        for row in &rows {
            let (Some(enterprise), Some(defo)) = (row.enterprise_id, row.analysis_id.and_then(|a| periods.deforestation_of(a))) else {
                continue;
            };
            let entry = acc.entry((enterprise, defo)).or_default();
            for fr in &row.risk_input {
                entry.input.insert(*fr);
                entry.sit_codes.input.extend(sit_codes_of(fr));
            }
            for fr in &row.risk_output {
                entry.output.insert(*fr);
                entry.sit_codes.output.extend(sit_codes_of(fr));
            }
        }

        Ok(acc
            .into_iter()
            .map(|(key, a)| {
                let detail = EnterpriseDetail {
                    risk_total: !a.input.is_empty() || !a.output.is_empty(),
                    risk_input: a.input.iter().map(|id| id.to_hex()).collect(),
                    risk_output: a.output.iter().map(|id| id.to_hex()).collect(),
                    sit_codes: a.sit_codes,
                };
                (key, RiskDetail::Enterprise(detail))
            })
            .collect())
    }
}

fn empty_detail(entity_type: EntityType) -> RiskDetail {
    match entity_type {
        EntityType::Adm3 => RiskDetail::Adm3(Adm3Detail::default()),
        EntityType::Farm => RiskDetail::Farm(FarmDetail::default()),
        EntityType::Enterprise => RiskDetail::Enterprise(EnterpriseDetail::default()),
    }
}

/// Newest period end first. Stable, so ties keep resolution order; items
/// without an end go last.
pub fn sort_newest_first(items: &mut [PeriodItem]) {
    newest_first(items, |item| item.period.end);
}

pub fn newest_first<T>(items: &mut [T], end_of: impl Fn(&T) -> Option<NaiveDateTime>) {
    items.sort_by(|a, b| match (end_of(a), end_of(b)) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use bson::doc;

    struct World {
        store: MemoryStore,
        adm3_x: ObjectId,
        adm3_y: ObjectId,
        old_defo: ObjectId,
        new_defo: ObjectId,
        a_old: ObjectId,
        a_new: ObjectId,
        farm_1: ObjectId,
        farm_2: ObjectId,
    }

    fn world() -> World {
        let store = MemoryStore::new();
        let adm3_x = store.insert(collections::ADM3, doc! { "name": "X", "label": "Antioquia, Medellín, X" });
        let adm3_y = store.insert(collections::ADM3, doc! { "name": "Y" });

        let old_defo = store.insert(collections::DEFORESTATION, doc! { "deforestation_type": "annual", "year_start": 2010, "year_end": 2012 });
        let new_defo = store.insert(collections::DEFORESTATION, doc! { "deforestation_type": "annual", "year_start": 2020, "year_end": 2021 });
        let a_old = store.insert(collections::ANALYSIS, doc! { "deforestation_id": old_defo });
        let a_new = store.insert(collections::ANALYSIS, doc! { "deforestation_id": new_defo });

        let farm_1 = store.insert(collections::FARM, doc! {
            "adm3_id": adm3_x,
            "ext_id": [{ "source": "SIT_CODE", "ext_code": "SIT-1" }],
        });
        let farm_2 = store.insert(collections::FARM, doc! {
            "adm3_id": { "$ref": "adm3", "$id": adm3_x },
            "ext_id": [{ "source": "SIT_CODE", "ext_code": "SIT-2" }],
        });

        store.insert(collections::ADM3_RISK, doc! { "adm3_id": adm3_x, "analysis_id": a_new, "def_ha": 7.5, "farm_amount": 2 });

        // Two rows for farm_1 in the same analysis: hectares must count once.
        store.insert(collections::FARM_RISK, doc! {
            "farm_id": farm_1, "analysis_id": a_new,
            "deforestation": { "prop": 0.1, "ha": 3.0, "distance": 0 },
            "risk_direct": true, "risk_input": false, "risk_output": false,
        });
        store.insert(collections::FARM_RISK, doc! {
            "farm_id": farm_1, "analysis_id": a_new,
            "deforestation": { "prop": 0.1, "ha": 3.0, "distance": 0 },
            "risk_direct": false, "risk_input": true, "risk_output": false,
        });
        store.insert(collections::FARM_RISK, doc! {
            "farm_id": farm_2, "analysis_id": a_new,
            "deforestation": { "prop": 0.0, "ha": 0.0, "distance": 10 },
            "risk_direct": false, "risk_input": false, "risk_output": false,
        });

        World { store, adm3_x, adm3_y, old_defo, new_defo, a_old, a_new, farm_1, farm_2 }
    }

    fn ids(list: &[ObjectId]) -> Vec<String> {
        list.iter().map(|id| id.to_hex()).collect()
    }

    fn adm3(item: &PeriodItem) -> &Adm3Detail {
        match &item.detail {
            RiskDetail::Adm3(d) => d,
            other => panic!("expected adm3 detail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn adm3_rollup_seeds_every_requested_id() {
        let w = world();
        let aggregator = RiskAggregator::new(&w.store, &QueryConfig::default());
        let out = aggregator
            .aggregate(
                EntityType::Adm3,
                &ids(&[w.adm3_x, w.adm3_y, w.adm3_x]),
                &Selector::Analyses(vec![w.a_old, w.a_new]),
            )
            .await
            .unwrap();

        assert_eq!(out.len(), 2);

        let x = &out[&w.adm3_x.to_hex()];
        assert_eq!(x.items.len(), 2);
        // newest first
        assert_eq!(x.items[0].deforestation_id, w.new_defo.to_hex());
        assert_eq!(x.items[1].deforestation_id, w.old_defo.to_hex());

        let newest = adm3(&x.items[0]);
        assert!(newest.risk_total);
        assert_eq!(newest.farm_amount, 2);
        assert_eq!(newest.def_ha, 7.5);
        assert_eq!(newest.farms_at_risk, 1);
        assert_eq!(newest.farm_def_ha, 3.0);
        assert!(newest.sit_codes.direct.contains("SIT-1"));
        assert!(newest.sit_codes.input.contains("SIT-1"));
        assert!(!newest.sit_codes.direct.contains("SIT-2"));

        let older = adm3(&x.items[1]);
        assert!(!older.risk_total);
        assert_eq!(older.farm_amount, 0);
        assert_eq!(older.def_ha, 0.0);

        let y = &out[&w.adm3_y.to_hex()];
        assert!(y.items.iter().all(|i| !adm3(i).risk_total && adm3(i).farm_amount == 0));
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_output() {
        let w = world();
        let aggregator = RiskAggregator::new(&w.store, &QueryConfig::default());
        let selector = Selector::Type(crate::database::models::DeforestationType::Annual);
        let first = aggregator.aggregate(EntityType::Adm3, &ids(&[w.adm3_x, w.adm3_y]), &selector).await.unwrap();
        let second = aggregator.aggregate(EntityType::Adm3, &ids(&[w.adm3_x, w.adm3_y]), &selector).await.unwrap();
        assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
    }

    #[tokio::test]
    async fn farm_scope_defaults_missing_rows() {
        let w = world();
        let aggregator = RiskAggregator::new(&w.store, &QueryConfig::default());
        let out = aggregator
            .aggregate(EntityType::Farm, &ids(&[w.farm_1, w.farm_2]), &Selector::Analyses(vec![w.a_old, w.a_new]))
            .await
            .unwrap();

        let farm_1 = &out[&w.farm_1.to_hex()];
        let RiskDetail::Farm(newest) = &farm_1.items[0].detail else { panic!("farm detail expected") };
        assert!(newest.risk_direct && newest.risk_input && !newest.risk_output);
        assert_eq!(newest.deforestation.ha, 3.0);

        let RiskDetail::Farm(older) = &farm_1.items[1].detail else { panic!("farm detail expected") };
        assert!(older.farmrisk_id.is_none());
        assert_eq!(older.deforestation, AreaMeasure::default());
    }

    #[tokio::test]
    async fn enterprise_scope_dereferences_farm_risks() {
        let w = world();
        let enterprise = w.store.insert(collections::ENTERPRISE, doc! { "name": "Frigorífico" });
        let fr = w.store.all(collections::FARM_RISK)[0].get_object_id("_id").unwrap();
        w.store.insert(collections::ENTERPRISE_RISK, doc! {
            "enterprise_id": enterprise,
            "analysis_id": w.a_new,
            "risk_input": [fr],
            "risk_output": [],
        });

        let aggregator = RiskAggregator::new(&w.store, &QueryConfig::default());
        let out = aggregator
            .aggregate(EntityType::Enterprise, &ids(&[enterprise]), &Selector::Analyses(vec![w.a_new]))
            .await
            .unwrap();

        let view = &out[&enterprise.to_hex()];
        let RiskDetail::Enterprise(detail) = &view.items[0].detail else { panic!("enterprise detail expected") };
        assert!(detail.risk_total);
        assert_eq!(detail.risk_input, vec![fr.to_hex()]);
        assert!(detail.risk_output.is_empty());
        assert!(detail.sit_codes.input.contains("SIT-1"));
    }

    #[tokio::test]
    async fn empty_selection_keeps_buckets() {
        let w = world();
        let aggregator = RiskAggregator::new(&w.store, &QueryConfig::default());
        let selector = Selector::Type(crate::database::models::DeforestationType::Warning);
        let out = aggregator.aggregate(EntityType::Adm3, &ids(&[w.adm3_x]), &selector).await.unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[&w.adm3_x.to_hex()].items.is_empty());
    }

    #[tokio::test]
    async fn malformed_id_fails_before_any_lookup() {
        let w = world();
        let aggregator = RiskAggregator::new(&w.store, &QueryConfig::default());
        let err = aggregator
            .aggregate(EntityType::Adm3, &["not-an-id".to_string()], &Selector::Analyses(vec![w.a_new]))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::Ids(IdError::Malformed { .. })));
        assert!(w.store.find_log().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_fatal() {
        let w = world();
        w.store.set_offline(true);
        let aggregator = RiskAggregator::new(&w.store, &QueryConfig::default());
        let err = aggregator
            .aggregate(EntityType::Adm3, &ids(&[w.adm3_x]), &Selector::Analyses(vec![w.a_new]))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::Store { stage: "periods", .. }));
        let api: ApiError = err.into();
        assert_eq!(api.status_code(), 503);
    }

    #[test]
    fn ties_keep_resolution_order() {
        let period = Period::default();
        let mut items: Vec<PeriodItem> = ["a", "b"]
            .iter()
            .map(|id| PeriodItem {
                deforestation_id: id.to_string(),
                analysis_ids: vec![],
                period,
                detail: RiskDetail::Adm3(Adm3Detail::default()),
            })
            .collect();
        sort_newest_first(&mut items);
        assert_eq!(items[0].deforestation_id, "a");
    }
}
