//! Profitability engine for z-margin.
//!
//! Raw usage and billing records flow through four stages:
//!
//! 1. [`normalizer`] maps each source's record shape to a `UsageEvent` or
//!    `RevenueEvent` and resolves the canonical customer.
//! 2. [`aggregator`] buckets events by customer, feature and UTC day.
//! 3. [`projector`] reshapes aggregates into dashboard views.
//! 4. [`insights`] evaluates threshold rules over the aggregates.
//!
//! [`MarginEngine`] ties the stages to a `z_margin_store::Store`.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use z_margin_core::{DateRange, SourceKind};
//! use z_margin_engine::{EngineConfig, MarginEngine};
//! use z_margin_store::MemoryStore;
//!
//! let engine = MarginEngine::new(Arc::new(MemoryStore::new()), EngineConfig::default());
//! let usage = json!({
//!     "customer_id": "acme",
//!     "feature": "gpt-4",
//!     "quantity": 100,
//!     "unit_cost": "0.002",
//!     "timestamp": "2024-01-01T09:30:00Z"
//! });
//! let report = engine.ingest(SourceKind::Metering, &[usage]).unwrap();
//! assert_eq!(report.accepted, 1);
//!
//! let range = DateRange::parse("2024-01-01", "2024-01-07").unwrap();
//! let dashboard = engine.dashboard(&range).unwrap();
//! assert_eq!(dashboard.time_series.len(), 7);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregator;
pub mod config;
pub mod engine;
pub mod insights;
pub mod normalizer;
pub mod projector;

pub use aggregator::aggregate;
pub use config::{EngineConfig, InsightThresholds, NormalizerConfig, PricingTable, RevenueJoin};
pub use engine::{
    IngestIssue, IngestIssueKind, IngestReport, MarginEngine, RebuildReport, SyncStatistics,
};
pub use normalizer::{NormalizedRecord, Normalizer};
pub use projector::{Dashboard, FeatureMetrics, FeatureMetricsView, Summary, TimeSeriesPoint};
