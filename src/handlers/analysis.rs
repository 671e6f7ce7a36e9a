use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::filter::FilterError;
use crate::services::analysis::{self, AnalysisRow};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ByDeforestationQuery {
    pub deforestation_id: Option<String>,
}

/// GET /analysis/by-deforestation?deforestation_id=
pub async fn by_deforestation(
    State(state): State<AppState>,
    Query(query): Query<ByDeforestationQuery>,
) -> ApiResult<Vec<AnalysisRow>> {
    let id = query
        .deforestation_id
        .ok_or_else(|| FilterError::MissingParameter("deforestation_id".to_string()))?;

    let rows = analysis::by_deforestation(state.store(), &state.config.query, &id).await?;
    if rows.is_empty() {
        return Err(ApiError::not_found(format!("No analyses found for deforestation {}", id)));
    }
    Ok(Json(rows))
}
