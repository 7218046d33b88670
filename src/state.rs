//! Shared application state for all routes.

use crate::config::ModelRegistry;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Built once at startup; read-only afterwards.
    pub registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(pool: PgPool, registry: ModelRegistry) -> Self {
        AppState {
            pool,
            registry: Arc::new(registry),
        }
    }
}
