#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

use ganabosques_api::auth::AccessGuard;
use ganabosques_api::config::{AppConfig, QueryConfig};
use ganabosques_api::database::{DocumentStore, MemoryStore};
use ganabosques_api::{app, AppState};

const SIGNING_KEY: &str = include_str!("../fixtures/signing_key.pem");
const JWKS: &str = include_str!("../fixtures/jwks.json");
const KID: &str = "ganabosques-test";

/// An in-process app over a [`MemoryStore`], with token verification pinned
/// to the fixture key set.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub config: AppConfig,
    router: Router,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        Self::with_query(QueryConfig::default())
    }

    pub fn with_query(query: QueryConfig) -> Result<Self> {
        let mut config = AppConfig::development();
        config.query = query;
        config.auth.jwks_json = Some(JWKS.to_string());
        config.api.enable_request_logging = false;

        let store = Arc::new(MemoryStore::new());
        let guard = AccessGuard::new(&config.auth).context("failed to build access guard")?;
        let shared: Arc<dyn DocumentStore> = store.clone();
        let router = app(AppState::new(shared, config.clone(), guard));
        Ok(Self { store, config, router })
    }

    /// Sign a token for `sub` carrying the given client roles.
    pub fn token(&self, sub: &str, roles: &[&str]) -> Result<String> {
        let claims = json!({
            "sub": sub,
            "iss": self.config.auth.issuer(),
            "aud": self.config.auth.audience,
            "exp": chrono::Utc::now().timestamp() + 3600,
            "resource_access": { (self.config.auth.client_id.clone()): { "roles": roles } },
        });
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(KID.to_string());
        let key = EncodingKey::from_rsa_pem(SIGNING_KEY.as_bytes())?;
        Ok(encode(&header, &claims, &key)?)
    }

    pub fn admin_token(&self) -> Result<String> {
        self.token("kc-admin", &["Admin"])
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.send("GET", uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> Result<(StatusCode, Value)> {
        self.send("POST", uri, token, Some(body)).await
    }

    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body from {}", uri))?
        };
        Ok((status, value))
    }
}
