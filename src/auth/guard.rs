use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::AuthError;
use crate::config::AuthConfig;

/// Claims stripped from the payload handed back to clients.
const HIDDEN_CLAIMS: [&str; 3] = ["realm_access", "allowed-origins", "resource_access"];

/// A verified token subject.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub sub: Option<String>,
    pub client_roles: Vec<String>,
    #[serde(skip)]
    payload: Map<String, Value>,
}

impl Principal {
    fn from_claims(mut claims: Map<String, Value>, client_id: &str) -> Self {
        let client_roles: Vec<String> = claims
            .get("resource_access")
            .and_then(|access| access.get(client_id))
            .and_then(|client| client.get("roles"))
            .and_then(Value::as_array)
            .map(|roles| roles.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        for claim in HIDDEN_CLAIMS {
            claims.remove(claim);
        }
        claims.insert("client_roles".to_string(), Value::from(client_roles.clone()));

        Self {
            sub: claims.get("sub").and_then(Value::as_str).map(str::to_string),
            client_roles,
            payload: claims,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.client_roles.iter().any(|r| r == role)
    }

    /// The decoded claims with provider internals removed and
    /// `client_roles` added.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

/// Validates bearer tokens against the realm's JWKS and proxies the token
/// grants the API exposes.
pub struct AccessGuard {
    config: AuthConfig,
    http: reqwest::Client,
    static_keys: Option<JwkSet>,
}

impl AccessGuard {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let static_keys = config
            .jwks_json
            .as_deref()
            .map(serde_json::from_str::<JwkSet>)
            .transpose()
            .map_err(|e| AuthError::KeysUnavailable(format!("AUTH_JWKS_JSON is not a key set: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        Ok(Self {
            config: config.clone(),
            http,
            static_keys,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn is_admin(&self, principal: &Principal) -> bool {
        principal.has_role(&self.config.admin_role)
    }

    async fn key_set(&self) -> Result<JwkSet, AuthError> {
        if let Some(keys) = &self.static_keys {
            return Ok(keys.clone());
        }

        let url = self.config.jwks_url();
        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!(%url, error = %e, "JWKS request failed");
            AuthError::KeysUnavailable(e.to_string())
        })?;

        if !response.status().is_success() {
            warn!(%url, status = %response.status(), "JWKS request rejected");
            return Err(AuthError::KeysUnavailable(format!("status {}", response.status())));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))
    }

    /// Verify signature, issuer, audience and expiry of `token`.
    pub async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::InvalidToken(format!("Invalid token: {}", e)))?;
        let kid = header.kid.ok_or(AuthError::UnknownKey)?;

        let keys = self.key_set().await?;
        let jwk = keys.find(&kid).ok_or(AuthError::UnknownKey)?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| AuthError::InvalidToken(format!("Invalid token: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.audience.as_str()]);
        validation.set_issuer(&[self.config.issuer()]);

        let data = decode::<Map<String, Value>>(token, &key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::InvalidToken(format!("Invalid token: {}", e)),
        })?;

        let principal = Principal::from_claims(data.claims, &self.config.client_id);
        debug!(sub = ?principal.sub, roles = ?principal.client_roles, "token verified");
        Ok(principal)
    }

    /// Resource-owner password grant.
    pub async fn password_grant(&self, username: &str, password: &str) -> Result<Value, AuthError> {
        self.token_request(&[
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("username", username),
            ("password", password),
        ])
        .await
    }

    pub async fn client_credentials(&self) -> Result<Value, AuthError> {
        self.token_request(&[
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<Value, AuthError> {
        let response = self
            .http
            .post(self.config.token_url())
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "token grant rejected");
            return Err(AuthError::InvalidCredentials);
        }

        response.json::<Value>().await.map_err(|e| AuthError::Provider(e.to_string()))
    }
}
