use std::sync::Arc;

use crate::auth::AccessGuard;
use crate::config::AppConfig;
use crate::database::DocumentStore;

/// Shared handler state. Cloned per request; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<AppConfig>,
    pub guard: Arc<AccessGuard>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: AppConfig, guard: AccessGuard) -> Self {
        Self {
            store,
            config: Arc::new(config),
            guard: Arc::new(guard),
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }
}
