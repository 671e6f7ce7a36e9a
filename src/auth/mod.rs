//! Bearer-token verification against the identity provider, plus the local
//! permission set a verified subject maps to.

pub mod guard;
pub mod permissions;

pub use guard::{AccessGuard, Principal};
pub use permissions::Permissions;

use axum::http::HeaderMap;
use thiserror::Error;

use crate::database::DatabaseError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingToken,

    #[error("{0}")]
    InvalidToken(String),

    #[error("Public key not found")]
    UnknownKey,

    #[error("Expired token")]
    Expired,

    #[error("Unable to fetch identity provider keys")]
    KeysUnavailable(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?;

    let value = header
        .to_str()
        .map_err(|_| AuthError::InvalidToken("Invalid Authorization header format".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .ok_or_else(|| AuthError::InvalidToken("Authorization header must use Bearer token format".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidToken("Empty bearer token".to_string()));
    }
    Ok(token)
}
