//! Aggregate maintenance handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use z_margin_engine::RebuildReport;

use super::RangeQuery;
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Rebuild every aggregate in a range from the event log.
///
/// The body is optional; missing bounds fall back to the default range.
pub async fn rebuild(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    body: Option<Json<RangeQuery>>,
) -> Result<Json<RebuildReport>, ApiError> {
    let query = body.map(|Json(query)| query).unwrap_or_default();
    let range = query.resolve(&state.engine)?;

    tracing::info!(
        service = %auth.service_name,
        start = %range.start,
        end = %range.end,
        "Rebuilding aggregates on request"
    );

    Ok(Json(state.engine.rebuild(&range)?))
}
