use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Permissions;
use crate::error::ApiResult;
use crate::middleware::authenticate;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /auth/login - password grant against the identity provider
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> ApiResult<Value> {
    Ok(Json(state.guard.password_grant(&body.username, &body.password).await?))
}

/// POST /auth/get-client-token - client-credentials grant
pub async fn client_token(State(state): State<AppState>) -> ApiResult<Value> {
    Ok(Json(state.guard.client_credentials().await?))
}

/// GET /auth/token/validate
pub async fn validate(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Value> {
    let principal = authenticate(&state, &headers).await?;
    Ok(Json(json!({ "valid": true, "payload": principal.payload() })))
}

/// GET /auth/permissions - local permission set of the token subject
pub async fn permissions(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Permissions> {
    let principal = authenticate(&state, &headers).await?;
    let permissions = match principal.sub.as_deref() {
        Some(sub) => Permissions::load(state.store(), sub).await?,
        None => Permissions::default(),
    };
    Ok(Json(permissions))
}
