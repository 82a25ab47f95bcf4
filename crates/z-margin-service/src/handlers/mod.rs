//! HTTP request handlers.

pub mod aggregates;
pub mod customers;
pub mod dashboard;
pub mod health;
pub mod ingest;
pub mod insights;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use z_margin_core::{parse_date, DateRange};
use z_margin_engine::MarginEngine;

use crate::error::ApiError;

/// Optional `start_date` / `end_date` bounds (`YYYY-MM-DD`, inclusive).
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    /// First day of the range.
    pub start_date: Option<String>,
    /// Last day of the range.
    pub end_date: Option<String>,
}

impl RangeQuery {
    /// Resolve against the engine's default range ending today (UTC).
    pub fn resolve(&self, engine: &MarginEngine) -> Result<DateRange, ApiError> {
        let start = parse_bound(self.start_date.as_deref())?;
        let end = parse_bound(self.end_date.as_deref())?;
        Ok(engine.resolve_range(start, end, Utc::now().date_naive())?)
    }
}

fn parse_bound(value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(parse_date)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}
