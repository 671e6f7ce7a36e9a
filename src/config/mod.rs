use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub query: QueryConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub name: String,
    /// Server selection timeout, seconds.
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub keycloak_url: String,
    pub realm: String,
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    /// Client role that grants access to admin-gated endpoints.
    pub admin_role: String,
    pub audience: String,
    /// Inline JWKS document. When set the identity provider is never contacted
    /// for keys.
    pub jwks_json: Option<String>,
    pub http_timeout_secs: u64,
}

impl AuthConfig {
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.keycloak_url.trim_end_matches('/'), self.realm)
    }

    pub fn jwks_url(&self) -> String {
        format!("{}/protocol/openid-connect/certs", self.issuer())
    }

    pub fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Distinct ids accepted per aggregation request.
    pub max_ids: usize,
    /// Ids per `$in` sub-batch.
    pub batch_chunk_size: usize,
    /// Row cap for list-all endpoints.
    pub list_limit: i64,
    pub page_default_limit: u64,
    pub page_max_limit: u64,
    pub farmrisk_page_size: u64,
    pub farmrisk_max_page_size: u64,
    pub search_max_terms: usize,
    pub search_max_term_len: usize,
    pub search_max_combinations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub enable_request_logging: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Defaults per environment, then specific env vars on top
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("MONGO_URI") {
            self.database.uri = v;
        }
        if let Ok(v) = env::var("MONGO_DB_NAME") {
            self.database.name = v;
        }
        if let Ok(v) = env::var("MONGO_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Auth overrides
        if let Ok(v) = env::var("KEYCLOAK_URL") {
            self.auth.keycloak_url = v;
        }
        if let Ok(v) = env::var("REALM_NAME").or_else(|_| env::var("KEYCLOAK_REALM")) {
            self.auth.realm = v;
        }
        if let Ok(v) = env::var("CLIENT_ID") {
            self.auth.client_id = v;
        }
        if let Ok(v) = env::var("CLIENT_SECRET") {
            self.auth.client_secret = v;
        }
        if let Ok(v) = env::var("AUTH_ADMIN_ROLE") {
            self.auth.admin_role = v;
        }
        if let Ok(v) = env::var("AUTH_AUDIENCE") {
            self.auth.audience = v;
        }
        if let Ok(v) = env::var("AUTH_JWKS_JSON") {
            self.auth.jwks_json = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("AUTH_HTTP_TIMEOUT_SECS") {
            self.auth.http_timeout_secs = v.parse().unwrap_or(self.auth.http_timeout_secs);
        }

        // Query overrides
        if let Ok(v) = env::var("MAX_IDS") {
            self.query.max_ids = v.parse().unwrap_or(self.query.max_ids);
        }
        if let Ok(v) = env::var("BATCH_CHUNK_SIZE") {
            self.query.batch_chunk_size = v.parse().unwrap_or(self.query.batch_chunk_size);
        }
        if let Ok(v) = env::var("LIST_LIMIT") {
            self.query.list_limit = v.parse().unwrap_or(self.query.list_limit);
        }
        if let Ok(v) = env::var("PAGE_DEFAULT_LIMIT") {
            self.query.page_default_limit = v.parse().unwrap_or(self.query.page_default_limit);
        }
        if let Ok(v) = env::var("PAGE_MAX_LIMIT") {
            self.query.page_max_limit = v.parse().unwrap_or(self.query.page_max_limit);
        }

        // API overrides
        if let Ok(v) = env::var("HOST") {
            self.api.host = v;
        }
        if let Ok(v) = env::var("PORT") {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Ok(v) = env::var("API_ENABLE_CORS") {
            self.api.enable_cors = v.parse().unwrap_or(self.api.enable_cors);
        }
        if let Ok(v) = env::var("API_CORS_ORIGINS") {
            self.api.cors_origins = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                uri: "mongodb://localhost:27017".to_string(),
                name: "ganabosques".to_string(),
                connection_timeout: 30,
            },
            auth: AuthConfig {
                keycloak_url: "http://localhost:8080".to_string(),
                realm: "ganabosques".to_string(),
                client_id: "ganabosques-api".to_string(),
                client_secret: String::new(),
                admin_role: "Admin".to_string(),
                audience: "account".to_string(),
                jwks_json: None,
                http_timeout_secs: 10,
            },
            query: QueryConfig::default(),
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                enable_cors: true,
                cors_origins: vec![],
                enable_request_logging: true,
            },
        }
    }

    pub fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.database.connection_timeout = 10;
        config.auth.http_timeout_secs = 5;
        config
    }

    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.database.connection_timeout = 5;
        config.auth.http_timeout_secs = 5;
        config.api.enable_request_logging = false;
        config
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_ids: 500,
            batch_chunk_size: 8000,
            list_limit: 1000,
            page_default_limit: 10,
            page_max_limit: 1000,
            farmrisk_page_size: 20,
            farmrisk_max_page_size: 200,
            search_max_terms: 5,
            search_max_term_len: 25,
            search_max_combinations: 50,
        }
    }
}

// Global config, initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_defaults() {
        let config = AppConfig::development();
        assert_eq!(config.query.max_ids, 500);
        assert_eq!(config.query.batch_chunk_size, 8000);
        assert_eq!(config.query.list_limit, 1000);
        assert_eq!(config.auth.admin_role, "Admin");
        assert!(config.api.enable_request_logging);
    }

    #[test]
    fn production_quiets_request_logging() {
        let config = AppConfig::production();
        assert!(!config.api.enable_request_logging);
        assert_eq!(config.database.connection_timeout, 5);
    }

    #[test]
    fn keycloak_urls_derive_from_realm() {
        let mut auth = AppConfig::development().auth;
        auth.keycloak_url = "https://sso.example.org/".to_string();
        auth.realm = "ganabosques".to_string();
        assert_eq!(auth.issuer(), "https://sso.example.org/realms/ganabosques");
        assert_eq!(
            auth.jwks_url(),
            "https://sso.example.org/realms/ganabosques/protocol/openid-connect/certs"
        );
        assert!(auth.token_url().ends_with("/openid-connect/token"));
    }
}
