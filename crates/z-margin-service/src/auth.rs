//! Authentication extractors.
//!
//! Read endpoints are open. Endpoints that ingest data, rebuild aggregates,
//! re-run rules or change customers require [`ServiceAuth`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the service API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Service authentication via API key.
///
/// Used by ingestion feeds and operators. Rejects every request when no
/// service key is configured.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The service name or identifier.
    pub service_name: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let expected_key = state
            .config
            .service_api_key
            .as_ref()
            .ok_or(ApiError::Unauthorized)?;

        if api_key != expected_key {
            tracing::debug!("Rejected request with invalid service API key");
            return Err(ApiError::Unauthorized);
        }

        let service_name = parts
            .headers
            .get("x-service-name")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(ServiceAuth { service_name })
    }
}
