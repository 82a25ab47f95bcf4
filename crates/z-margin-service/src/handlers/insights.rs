//! Insight handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use z_margin_core::InsightFlag;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Insight list response.
#[derive(Debug, Serialize)]
pub struct InsightsResponse {
    /// Flags in rule order.
    pub insights: Vec<InsightFlag>,
    /// Number of flags.
    pub count: usize,
}

impl From<Vec<InsightFlag>> for InsightsResponse {
    fn from(insights: Vec<InsightFlag>) -> Self {
        Self {
            count: insights.len(),
            insights,
        }
    }
}

/// The insight set from the latest evaluation.
pub async fn list_insights(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InsightsResponse>, ApiError> {
    Ok(Json(state.engine.insights()?.into()))
}

/// Re-run the rules now and return the new set.
pub async fn evaluate_insights(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
) -> Result<Json<InsightsResponse>, ApiError> {
    tracing::debug!(service = %auth.service_name, "Evaluating insights on request");
    let flags = state.engine.evaluate_insights(Utc::now())?;
    Ok(Json(flags.into()))
}
