use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::ApiResult;
use crate::filter::FilterError;
use crate::services::farmrisk::{FarmRiskPage, FarmRiskService};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalysisFarmRequest {
    #[serde(default)]
    pub analysis_ids: Vec<String>,
    #[serde(default)]
    pub farm_ids: Vec<String>,
}

/// POST /farmrisk/by-analysis-and-farm
pub async fn by_analysis_and_farm(
    State(state): State<AppState>,
    Json(body): Json<AnalysisFarmRequest>,
) -> ApiResult<BTreeMap<String, Vec<Value>>> {
    let service = FarmRiskService::new(state.store(), &state.config.query);
    Ok(Json(service.by_analysis_and_farm(&body.analysis_ids, &body.farm_ids).await?))
}

#[derive(Debug, Deserialize)]
pub struct AnalysisPageQuery {
    pub analysis_id: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

/// GET /farmrisk/by-analysis-id?analysis_id=&page=&page_size=
pub async fn by_analysis_id(
    State(state): State<AppState>,
    Query(query): Query<AnalysisPageQuery>,
) -> ApiResult<FarmRiskPage> {
    let analysis_id = query
        .analysis_id
        .ok_or_else(|| FilterError::MissingParameter("analysis_id".to_string()))?;
    let service = FarmRiskService::new(state.store(), &state.config.query);
    Ok(Json(service.page_by_analysis(&analysis_id, query.page, query.page_size).await?))
}
