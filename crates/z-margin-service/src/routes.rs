//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{aggregates, customers, dashboard, health, ingest, insights};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent ingest and rebuild requests.
/// Each one rewrites aggregate ranges, so they are kept few.
const WRITE_MAX_CONCURRENT_REQUESTS: usize = 8;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Views
/// - `GET /v1/dashboard` - Summary, feature table and time series
/// - `GET /v1/features` - Feature table
/// - `GET /v1/timeseries` - Daily series
/// - `GET /v1/insights` - Latest insight set
/// - `GET /v1/ingest/stats` - Sync statistics
/// - `GET /v1/customers` - Customer list
///
/// ## Writes (Service API Key auth)
/// - `POST /v1/ingest/:source` - Ingest a batch of raw records
/// - `POST /v1/aggregates/rebuild` - Rebuild a range
/// - `POST /v1/insights/evaluate` - Re-run the insight rules
/// - `POST /v1/customers/:id/deactivate` - Deactivate a customer
/// - `PUT /v1/customers/:id/usage-limit` - Assign a usage limit
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let write_routes = Router::new()
        .route("/ingest/:source", post(ingest::ingest_batch))
        .route("/aggregates/rebuild", post(aggregates::rebuild))
        .layer(ConcurrencyLimitLayer::new(WRITE_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Views
        .route("/dashboard", get(dashboard::get_dashboard))
        .route("/features", get(dashboard::get_feature_metrics))
        .route("/timeseries", get(dashboard::get_time_series))
        .route("/ingest/stats", get(ingest::sync_statistics))
        // Insights
        .route("/insights", get(insights::list_insights))
        .route("/insights/evaluate", post(insights::evaluate_insights))
        // Customers
        .route("/customers", get(customers::list_customers))
        .route(
            "/customers/:id/deactivate",
            post(customers::deactivate_customer),
        )
        .route("/customers/:id/usage-limit", put(customers::set_usage_limit))
        // Ingest and rebuild (with their own concurrency limit)
        .merge(write_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
