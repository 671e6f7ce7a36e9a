use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::config::ApiConfig;
use crate::handlers::{analysis, auth, collections, enterprise_risk, enums, farmrisk, risk, system, verification};
use crate::middleware::{require_admin, require_token};
use crate::state::AppState;

/// The complete application router.
pub fn app(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .merge(collections::router(&state))
        .merge(public_routes())
        .merge(token_routes(&state))
        .merge(admin_routes(&state));

    if state.config.api.enable_cors {
        app = app.layer(cors_layer(&state.config.api));
    }
    if state.config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }
    app.with_state(state)
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/risk/by-ids-and-type", post(risk::by_ids_and_type))
        .route("/adm3risk/by-analysis-and-adm3", post(risk::adm3_by_analysis_and_adm3))
        .route("/adm3risk/by-adm3-and-type", post(risk::adm3_by_adm3_and_type))
        .route("/analysis/by-deforestation", get(analysis::by_deforestation))
        .route("/enums/", get(enums::values))
        .route("/auth/login", post(auth::login))
        .route("/auth/get-client-token", post(auth::client_token))
        .route("/auth/token/validate", get(auth::validate))
        .route("/auth/permissions", get(auth::permissions))
}

fn token_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/farmriskverification/", post(verification::create))
        .route_layer(from_fn_with_state(state.clone(), require_token))
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/farmrisk/by-analysis-and-farm", post(farmrisk::by_analysis_and_farm))
        .route("/farmrisk/by-analysis-id", get(farmrisk::by_analysis_id))
        .route("/enterprise-risk/details/by-enterprise", post(enterprise_risk::details_by_enterprise))
        .route_layer(from_fn_with_state(state.clone(), require_admin))
}

fn cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| warn!(%origin, "ignoring invalid CORS origin"))
                .ok()
        })
        .collect();
    CorsLayer::permissive().allow_origin(origins)
}
