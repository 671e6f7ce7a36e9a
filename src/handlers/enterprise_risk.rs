use axum::{extract::State, Json};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::services::enterprise_risk::{EnterpriseDetails, EnterpriseRiskService};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnterpriseDetailsRequest {
    pub analysis_id: String,
    #[serde(default)]
    pub enterprise_ids: Vec<String>,
}

/// POST /enterprise-risk/details/by-enterprise
pub async fn details_by_enterprise(
    State(state): State<AppState>,
    Json(body): Json<EnterpriseDetailsRequest>,
) -> ApiResult<Vec<EnterpriseDetails>> {
    let service = EnterpriseRiskService::new(state.store(), &state.config.query);
    Ok(Json(service.details(&body.analysis_id, &body.enterprise_ids).await?))
}
