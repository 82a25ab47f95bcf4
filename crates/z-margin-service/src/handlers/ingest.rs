//! Ingestion handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use z_margin_core::SourceKind;
use z_margin_engine::{IngestReport, SyncStatistics};

use super::RangeQuery;
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// A batch of raw records: either a bare array or `{"records": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IngestRequest {
    /// A bare array of records.
    Batch(Vec<Value>),
    /// Records wrapped in an object.
    Wrapped {
        /// Raw records in source format.
        records: Vec<Value>,
    },
}

impl IngestRequest {
    fn into_records(self) -> Vec<Value> {
        match self {
            Self::Batch(records) | Self::Wrapped { records } => records,
        }
    }
}

/// Ingest a batch of raw records from one source.
pub async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(source): Path<String>,
    Json(body): Json<IngestRequest>,
) -> Result<Json<IngestReport>, ApiError> {
    let source: SourceKind = source.parse().map_err(ApiError::BadRequest)?;
    let records = body.into_records();

    tracing::debug!(
        service = %auth.service_name,
        source = %source,
        records = records.len(),
        "Processing ingest batch"
    );

    let report = state.engine.ingest(source, &records)?;
    Ok(Json(report))
}

/// Event and customer counts for a range.
pub async fn sync_statistics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<SyncStatistics>, ApiError> {
    let range = query.resolve(&state.engine)?;
    Ok(Json(state.engine.sync_statistics(&range)?))
}
