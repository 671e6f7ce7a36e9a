use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET / - service metadata
pub async fn root() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "endpoints": {
            "collections": "/{collection}/[by-ids|by-name|by-extid|paged/]",
            "risk": "/risk/by-ids-and-type",
            "adm3risk": "/adm3risk/by-analysis-and-adm3, /adm3risk/by-adm3-and-type",
            "farmrisk": "/farmrisk/by-analysis-and-farm, /farmrisk/by-analysis-id (admin)",
            "enterprise_risk": "/enterprise-risk/details/by-enterprise (admin)",
            "verification": "/farmriskverification/ (token)",
            "enums": "/enums/?enum_name=",
            "auth": "/auth/login, /auth/get-client-token, /auth/token/validate, /auth/permissions",
        }
    }))
}

/// GET /health - 503 when the store does not answer a ping
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    match state.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "timestamp": now, "database": "ok" })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "timestamp": now, "error": "database unavailable" })),
            )
        }
    }
}
