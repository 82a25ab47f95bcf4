//! Application state.

use std::sync::Arc;

use z_margin_engine::MarginEngine;
use z_margin_store::Store;

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The margin engine over the configured store.
    pub engine: Arc<MarginEngine>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let engine = Arc::new(MarginEngine::new(store, config.engine.clone()));

        tracing::info!(
            backend = engine.backend_name(),
            reporting_currency = %config.engine.normalizer.reporting_currency,
            priced_models = config.engine.normalizer.pricing.len(),
            "Margin engine ready"
        );

        if config.service_api_key.is_none() {
            tracing::warn!(
                "SERVICE_API_KEY not configured - mutating endpoints will reject all requests"
            );
        }

        Self { engine, config }
    }
}
