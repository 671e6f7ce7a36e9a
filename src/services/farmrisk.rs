//! FarmRisk rows enriched for review screens.

use bson::{doc, oid::ObjectId, Document};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::api::format::{bson_to_json, document_to_json, serialize_oid_opt};
use crate::config::QueryConfig;
use crate::database::models::deforestation::serialize_timestamp;
use crate::database::models::farm::ext_ids;
use crate::database::models::{collections, get_datetime, get_document, get_f64, Adm3, AreaMeasure, ExtId, FarmRisk, FarmRiskVerification};
use crate::database::reference::{ref_in, resolve_field, validate_ids};
use crate::database::{Batcher, DocumentStore, FindQuery};
use crate::filter::{FilterError, PageWindow};
use crate::services::label::split_label;
use crate::services::risk::{at, AggregateError};

/// Newest verification of a FarmRisk row.
#[derive(Debug, Clone, Serialize)]
pub struct LatestVerification {
    #[serde(serialize_with = "serialize_oid_opt")]
    pub id: Option<ObjectId>,
    #[serde(serialize_with = "serialize_oid_opt")]
    pub user_id: Option<ObjectId>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub verification: Option<NaiveDateTime>,
    pub observation: Option<String>,
    pub status: bool,
}

impl From<FarmRiskVerification> for LatestVerification {
    fn from(v: FarmRiskVerification) -> Self {
        Self {
            id: v.id,
            user_id: v.user_id,
            verification: v.verification,
            observation: v.observation,
            status: v.status,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmInfo {
    pub farm_id: String,
    pub adm3_id: Option<String>,
    pub adm3_name: Option<String>,
    pub ext_id: Vec<ExtId>,
    pub enable: Option<bool>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created: Option<NaiveDateTime>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub updated: Option<NaiveDateTime>,
    pub latitude: Option<f64>,
    pub longitud: Option<f64>,
    pub geojson: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmRiskPageItem {
    pub id: String,
    pub analysis_id: String,
    pub farm_id: Option<String>,
    pub farm_polygons_id: Option<String>,
    pub risk_direct: bool,
    pub risk_input: bool,
    pub risk_output: bool,
    pub deforestation: AreaMeasure,
    pub protected: AreaMeasure,
    pub farming_in: AreaMeasure,
    pub farming_out: AreaMeasure,
    pub farm: Option<FarmInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FarmRiskPage {
    pub page: u64,
    pub page_size: u64,
    pub items: Vec<FarmRiskPageItem>,
}

pub struct FarmRiskService<'a> {
    batcher: Batcher<'a>,
    query: QueryConfig,
}

impl<'a> FarmRiskService<'a> {
    pub fn new(store: &'a dyn DocumentStore, query: &QueryConfig) -> Self {
        Self {
            batcher: Batcher::new(store, query.batch_chunk_size),
            query: query.clone(),
        }
    }

    /// FarmRisk documents of the given farms and analyses, grouped by analysis
    /// id and decorated with label parts and the latest verification.
    pub async fn by_analysis_and_farm(
        &self,
        analysis_ids: &[String],
        farm_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Value>>, AggregateError> {
        let analyses = validate_ids(analysis_ids, "analysis_ids", self.query.max_ids, false)?;
        let farms = validate_ids(farm_ids, "farm_ids", self.query.max_ids, false)?;

        let mut grouped: BTreeMap<String, Vec<Value>> =
            analyses.iter().map(|a| (a.to_hex(), Vec::new())).collect();

        let rows = self
            .batcher
            .fetch_by_with(collections::FARM_RISK, "farm_id", &farms, ref_in("analysis_id", &analyses), &[])
            .await
            .map_err(at("farmrisk"))?;
        if rows.is_empty() {
            return Ok(grouped);
        }

        let farm_docs = self
            .batcher
            .fetch(collections::FARM, &farms, &["adm3_id"])
            .await
            .map_err(at("farms"))?;
        let farm_to_adm3: HashMap<ObjectId, ObjectId> = farm_docs
            .iter()
            .filter_map(|(id, d)| Some((*id, resolve_field(d, "adm3_id")?)))
            .collect();

        let adm3_ids: Vec<ObjectId> = distinct(farm_to_adm3.values().copied());
        let labels: HashMap<ObjectId, Option<String>> = self
            .batcher
            .fetch(collections::ADM3, &adm3_ids, &Adm3::FIELDS)
            .await
            .map_err(at("adm3"))?
            .values()
            .filter_map(Adm3::from_document)
            .map(|a| (a.id, a.label))
            .collect();

        let row_ids: Vec<ObjectId> = rows.iter().filter_map(|d| resolve_field(d, "_id")).collect();
        let latest = self.latest_verifications(&row_ids).await?;

        for row in &rows {
            let Some(analysis) = resolve_field(row, "analysis_id") else { continue };
            let label = resolve_field(row, "farm_id")
                .and_then(|farm| farm_to_adm3.get(&farm))
                .and_then(|adm3| labels.get(adm3))
                .and_then(|label| label.as_deref());
            let parts = split_label(label);

            let mut value = document_to_json(row);
            if let Value::Object(map) = &mut value {
                map.insert("department".into(), parts.department.into());
                map.insert("municipality".into(), parts.municipality.into());
                map.insert("vereda".into(), parts.vereda.into());
                let verification = resolve_field(row, "_id")
                    .and_then(|id| latest.get(&id))
                    .and_then(|v| serde_json::to_value(v).ok())
                    .unwrap_or(Value::Null);
                map.insert("verification".into(), verification);
            }
            grouped.entry(analysis.to_hex()).or_default().push(value);
        }

        Ok(grouped)
    }

    async fn latest_verifications(
        &self,
        farmrisk_ids: &[ObjectId],
    ) -> Result<HashMap<ObjectId, LatestVerification>, AggregateError> {
        let docs = self
            .batcher
            .fetch_by(collections::FARM_RISK_VERIFICATION, "farmrisk", farmrisk_ids, &FarmRiskVerification::FIELDS)
            .await
            .map_err(at("verification"))?;

        let mut latest: HashMap<ObjectId, FarmRiskVerification> = HashMap::new();
        for record in docs.iter().map(FarmRiskVerification::from_document) {
            let Some(farmrisk) = record.farmrisk_id else { continue };
            match latest.get(&farmrisk) {
                Some(current) if current.verification >= record.verification => {}
                _ => {
                    latest.insert(farmrisk, record);
                }
            }
        }
        Ok(latest.into_iter().map(|(k, v)| (k, v.into())).collect())
    }

    /// One page of an analysis' FarmRisk rows in `_id` order, with the farm,
    /// its first polygon and its adm3 name attached.
    pub async fn page_by_analysis(
        &self,
        analysis_id: &str,
        page: Option<u64>,
        page_size: Option<u64>,
    ) -> Result<FarmRiskPage, AggregateError> {
        let analysis = validate_ids(&[analysis_id], "analysis_id", 1, false)?[0];
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(FilterError::InvalidPage("page must be at least 1".to_string()).into());
        }
        let page_size = page_size.unwrap_or(self.query.farmrisk_page_size);
        if page_size == 0 || page_size > self.query.farmrisk_max_page_size {
            return Err(FilterError::InvalidLimit(format!(
                "page_size must be between 1 and {}",
                self.query.farmrisk_max_page_size
            ))
            .into());
        }

        let skip = PageWindow::offset(page, page_size)?;

        let query = FindQuery::new(ref_in("analysis_id", &[analysis]))
            .sort(doc! { "_id": 1 })
            .skip(skip)
            .limit(page_size as i64);
        let rows = self
            .batcher
            .store()
            .find(collections::FARM_RISK, query)
            .await
            .map_err(at("farmrisk"))?;

        let mut out = FarmRiskPage { page, page_size, items: Vec::new() };
        if rows.is_empty() {
            return Ok(out);
        }

        let farm_ids = distinct(rows.iter().filter_map(|d| resolve_field(d, "farm_id")));
        let farms = self
            .batcher
            .fetch(collections::FARM, &farm_ids, &["adm3_id", "ext_id", "log", "created", "updated"])
            .await
            .map_err(at("farms"))?;

        let mut polygons: HashMap<ObjectId, Document> = HashMap::new();
        for polygon in self
            .batcher
            .fetch_by(collections::FARM_POLYGONS, "farm_id", &farm_ids, &["farm_id", "latitude", "longitud", "geojson"])
            .await
            .map_err(at("farmpolygons"))?
        {
            if let Some(farm) = resolve_field(&polygon, "farm_id") {
                polygons.entry(farm).or_insert(polygon);
            }
        }

        let adm3_ids = distinct(farms.values().filter_map(|d| resolve_field(d, "adm3_id")));
        let adm3_names: HashMap<ObjectId, Option<String>> = self
            .batcher
            .fetch(collections::ADM3, &adm3_ids, &["name"])
            .await
            .map_err(at("adm3"))?
            .values()
            .filter_map(Adm3::from_document)
            .map(|a| (a.id, a.name))
            .collect();

        for doc in &rows {
            let Some(row) = FarmRisk::from_document(doc) else { continue };
            let farm = row
                .farm_id
                .and_then(|id| farms.get(&id).map(|d| (id, d)))
                .map(|(id, d)| farm_info(id, d, polygons.get(&id), &adm3_names));

            out.items.push(FarmRiskPageItem {
                id: row.id.to_hex(),
                analysis_id: analysis.to_hex(),
                farm_id: row.farm_id.map(|id| id.to_hex()),
                farm_polygons_id: row.farm_polygons_id.map(|id| id.to_hex()),
                risk_direct: row.risk_direct,
                risk_input: row.risk_input,
                risk_output: row.risk_output,
                deforestation: row.deforestation,
                protected: row.protected,
                farming_in: row.farming_in,
                farming_out: row.farming_out,
                farm,
            });
        }
        Ok(out)
    }
}

fn farm_info(
    id: ObjectId,
    doc: &Document,
    polygon: Option<&Document>,
    adm3_names: &HashMap<ObjectId, Option<String>>,
) -> FarmInfo {
    let adm3 = resolve_field(doc, "adm3_id");
    FarmInfo {
        farm_id: id.to_hex(),
        adm3_id: adm3.map(|a| a.to_hex()),
        adm3_name: adm3.and_then(|a| adm3_names.get(&a).cloned().flatten()),
        ext_id: ext_ids(doc),
        enable: get_document(doc, "log").and_then(|log| log.get_bool("enable").ok()),
        created: get_datetime(doc, "created"),
        updated: get_datetime(doc, "updated"),
        latitude: polygon.and_then(|p| get_f64(p, "latitude")),
        longitud: polygon.and_then(|p| get_f64(p, "longitud")),
        geojson: polygon.and_then(|p| p.get("geojson")).map(bson_to_json),
    }
}

fn distinct(ids: impl Iterator<Item = ObjectId>) -> Vec<ObjectId> {
    let mut seen = std::collections::BTreeSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}
