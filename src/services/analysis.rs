use bson::doc;
use chrono::NaiveDateTime;
use serde::Serialize;

use crate::config::QueryConfig;
use crate::database::models::deforestation::serialize_timestamp;
use crate::database::models::{collections, Analysis, Deforestation};
use crate::database::reference::{ref_in, validate_ids};
use crate::database::{DocumentStore, FindQuery};
use crate::services::risk::{at, AggregateError};

/// An analysis with its deforestation dataset inlined.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRow {
    pub id: String,
    pub protected_areas_id: Option<String>,
    pub farming_areas_id: Option<String>,
    pub deforestation_id: Option<String>,
    pub deforestation_source: Option<String>,
    pub deforestation_type: Option<String>,
    pub deforestation_name: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub deforestation_period_start: Option<NaiveDateTime>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub deforestation_period_end: Option<NaiveDateTime>,
    pub deforestation_path: Option<String>,
    pub user_id: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub date: Option<NaiveDateTime>,
}

/// Analyses referencing `deforestation_id`, in `_id` order. Empty when none do.
pub async fn by_deforestation(
    store: &dyn DocumentStore,
    query: &QueryConfig,
    deforestation_id: &str,
) -> Result<Vec<AnalysisRow>, AggregateError> {
    let id = validate_ids(&[deforestation_id], "deforestation_id", 1, false)?[0];

    let find = FindQuery::new(ref_in("deforestation_id", &[id]))
        .project(&Analysis::FIELDS)
        .sort(doc! { "_id": 1 })
        .limit(query.list_limit);
    let analyses: Vec<Analysis> = store
        .find(collections::ANALYSIS, find)
        .await
        .map_err(at("analysis"))?
        .iter()
        .filter_map(Analysis::from_document)
        .collect();
    if analyses.is_empty() {
        return Ok(Vec::new());
    }

    let deforestation = store
        .find_one(collections::DEFORESTATION, doc! { "_id": id })
        .await
        .map_err(at("deforestation"))?
        .as_ref()
        .and_then(Deforestation::from_document);

    let hex = |id: Option<bson::oid::ObjectId>| id.map(|id| id.to_hex());
    Ok(analyses
        .into_iter()
        .map(|a| {
            let d = deforestation.as_ref();
            AnalysisRow {
                id: a.id.to_hex(),
                protected_areas_id: hex(a.protected_areas_id),
                farming_areas_id: hex(a.farming_areas_id),
                deforestation_id: hex(a.deforestation_id),
                deforestation_source: d.and_then(|d| d.source.clone()),
                deforestation_type: d.and_then(|d| d.kind.clone()),
                deforestation_name: d.and_then(|d| d.name.clone()),
                deforestation_period_start: d.and_then(|d| d.period.start),
                deforestation_period_end: d.and_then(|d| d.period.end),
                deforestation_path: d.and_then(|d| d.path.clone()),
                user_id: hex(a.user_id),
                date: a.date,
            }
        })
        .collect())
}
