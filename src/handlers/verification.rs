use axum::{extract::State, http::StatusCode, Extension, Json};

use crate::auth::{AuthError, Principal};
use crate::error::ApiError;
use crate::services::verification::{self, NewVerification, VerificationRecord};
use crate::state::AppState;

/// POST /farmriskverification/ - record a verification by the token subject
pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewVerification>,
) -> Result<(StatusCode, Json<VerificationRecord>), ApiError> {
    let subject = principal
        .sub
        .as_deref()
        .ok_or_else(|| AuthError::InvalidToken("Token has no subject".to_string()))?;

    let record = verification::create(state.store(), subject, body).await?;
    Ok((StatusCode::CREATED, Json(record)))
}
