//! Common test utilities for z-margin integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};

use z_margin_service::{create_router, AppState, ServiceConfig};
use z_margin_store::MemoryStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The service API key for mutating requests.
    pub service_api_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        let service_api_key = "test-service-key".to_string();

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            service_api_key: Some(service_api_key.clone()),
            enable_scheduler: false,
            ..ServiceConfig::default()
        };

        let state = AppState::new(Arc::new(MemoryStore::new()), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            service_api_key,
        }
    }

    /// The API key header for service requests.
    pub fn api_key_header(&self) -> (HeaderName, HeaderValue) {
        (
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(&self.service_api_key).expect("valid header value"),
        )
    }

    /// Ingest a batch for `source` and return the report.
    pub async fn ingest(&self, source: &str, records: Value) -> Value {
        let (name, value) = self.api_key_header();
        let response = self
            .server
            .post(&format!("/v1/ingest/{source}"))
            .add_header(name, value)
            .json(&records)
            .await;
        response.assert_status_ok();
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A metering usage record.
pub fn usage(customer: &str, feature: &str, quantity: u64, unit_cost: &str, date: &str) -> Value {
    json!({
        "event_id": format!("{customer}-{feature}-{date}-{quantity}"),
        "customer_id": customer,
        "feature": feature,
        "quantity": quantity,
        "unit_cost": unit_cost,
        "timestamp": format!("{date}T12:00:00Z"),
    })
}
