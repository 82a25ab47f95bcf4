//! Dashboard view handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::NaiveDate;
use serde::Serialize;
use z_margin_engine::{Dashboard, FeatureMetricsView, TimeSeriesPoint};

use super::RangeQuery;
use crate::error::ApiError;
use crate::state::AppState;

/// Time series response.
#[derive(Debug, Serialize)]
pub struct TimeSeriesResponse {
    /// First day of the range.
    pub start_date: NaiveDate,
    /// Last day of the range.
    pub end_date: NaiveDate,
    /// One point per day.
    pub points: Vec<TimeSeriesPoint>,
}

/// Summary, feature table and time series for a range.
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Dashboard>, ApiError> {
    let range = query.resolve(&state.engine)?;
    Ok(Json(state.engine.dashboard(&range)?))
}

/// Feature table for a range.
pub async fn get_feature_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<FeatureMetricsView>, ApiError> {
    let range = query.resolve(&state.engine)?;
    Ok(Json(state.engine.feature_metrics(&range)?))
}

/// Daily series for a range.
pub async fn get_time_series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<TimeSeriesResponse>, ApiError> {
    let range = query.resolve(&state.engine)?;
    let points = state.engine.time_series(&range)?;
    Ok(Json(TimeSeriesResponse {
        start_date: range.start,
        end_date: range.end,
        points,
    }))
}
