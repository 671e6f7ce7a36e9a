use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::database::models::DeforestationType;
use crate::error::{ApiError, ApiResult};
use crate::middleware::authorize_admin;
use crate::services::adm3_risk::{Adm3AnalysisRow, Adm3RiskService, Adm3TypeGroup};
use crate::services::periods::Selector;
use crate::services::risk::{EntityRiskView, EntityType, RiskAggregator};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RiskRequest {
    pub entity_type: String,
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub analysis_ids: Option<Vec<String>>,
    pub deforestation_ids: Option<Vec<String>>,
}

/// POST /risk/by-ids-and-type - unified rollup; farm and enterprise scopes are admin-only
pub async fn by_ids_and_type(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RiskRequest>,
) -> ApiResult<BTreeMap<String, EntityRiskView>> {
    let entity_type: EntityType = body.entity_type.parse().map_err(ApiError::bad_request)?;
    if entity_type != EntityType::Adm3 {
        authorize_admin(&state, &headers).await?;
    }

    let selector = Selector::pick(
        body.analysis_ids.as_deref(),
        body.deforestation_ids.as_deref(),
        body.kind.as_deref(),
        state.config.query.max_ids,
    )
    .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let aggregator = RiskAggregator::new(state.store(), &state.config.query);
    let views = aggregator.aggregate(entity_type, &body.ids, &selector).await?;
    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
pub struct AnalysisAdm3Request {
    #[serde(default)]
    pub analysis_ids: Vec<String>,
    #[serde(default)]
    pub adm3_ids: Vec<String>,
}

/// POST /adm3risk/by-analysis-and-adm3
pub async fn adm3_by_analysis_and_adm3(
    State(state): State<AppState>,
    Json(body): Json<AnalysisAdm3Request>,
) -> ApiResult<BTreeMap<String, Vec<Adm3AnalysisRow>>> {
    let service = Adm3RiskService::new(state.store(), &state.config.query);
    Ok(Json(service.by_analysis_and_adm3(&body.analysis_ids, &body.adm3_ids).await?))
}

#[derive(Debug, Deserialize)]
pub struct Adm3TypeRequest {
    #[serde(default)]
    pub adm3_ids: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// POST /adm3risk/by-adm3-and-type
pub async fn adm3_by_adm3_and_type(
    State(state): State<AppState>,
    Json(body): Json<Adm3TypeRequest>,
) -> ApiResult<BTreeMap<String, Adm3TypeGroup>> {
    let kind: DeforestationType = body.kind.parse().map_err(ApiError::bad_request)?;
    let service = Adm3RiskService::new(state.store(), &state.config.query);
    Ok(Json(service.by_adm3_and_type(&body.adm3_ids, kind).await?))
}
