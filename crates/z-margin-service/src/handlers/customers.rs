//! Customer handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use z_margin_core::{Customer, CustomerId};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Customer list response.
#[derive(Debug, Serialize)]
pub struct CustomersResponse {
    /// Every known customer.
    pub customers: Vec<Customer>,
    /// Number of customers.
    pub count: usize,
}

/// Usage limit request. `null` clears the limit.
#[derive(Debug, Deserialize)]
pub struct UsageLimitRequest {
    /// Limit in usage units.
    pub usage_limit: Option<Decimal>,
}

fn parse_customer_id(id: &str) -> Result<CustomerId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid customer ID: {id}")))
}

/// List customers.
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CustomersResponse>, ApiError> {
    let customers = state.engine.customers()?;
    Ok(Json(CustomersResponse {
        count: customers.len(),
        customers,
    }))
}

/// Deactivate a customer.
pub async fn deactivate_customer(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(id): Path<String>,
) -> Result<Json<Customer>, ApiError> {
    let id = parse_customer_id(&id)?;
    tracing::info!(service = %auth.service_name, customer_id = %id, "Deactivating customer");
    Ok(Json(state.engine.deactivate_customer(&id)?))
}

/// Assign or clear a customer's usage limit.
pub async fn set_usage_limit(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(id): Path<String>,
    Json(body): Json<UsageLimitRequest>,
) -> Result<Json<Customer>, ApiError> {
    let id = parse_customer_id(&id)?;
    if body.usage_limit.is_some_and(|limit| limit < Decimal::ZERO) {
        return Err(ApiError::BadRequest("Usage limit must not be negative".into()));
    }

    tracing::info!(
        service = %auth.service_name,
        customer_id = %id,
        usage_limit = ?body.usage_limit,
        "Setting usage limit"
    );
    Ok(Json(state.engine.set_usage_limit(&id, body.usage_limit)?))
}
