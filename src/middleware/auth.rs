use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::{extract_bearer, AuthError, Principal};
use crate::error::ApiError;
use crate::state::AppState;

/// Verify the bearer token and inject the [`Principal`] into the request.
pub async fn require_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, &headers).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Like [`require_token`], additionally requiring the configured admin client role.
pub async fn require_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = authorize_admin(&state, &headers).await?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

/// Admin check for handlers whose gate depends on the request body.
pub async fn authorize_admin(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let principal = authenticate(state, headers).await?;
    if !state.guard.is_admin(&principal) {
        tracing::info!(sub = ?principal.sub, "admin role missing");
        return Err(AuthError::Forbidden(format!("Role '{}' required", state.guard.config().admin_role)).into());
    }
    Ok(principal)
}

pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, AuthError> {
    let token = extract_bearer(headers)?;
    state.guard.verify(token).await.map_err(|e| {
        tracing::debug!(error = %e, "token rejected");
        e
    })
}
