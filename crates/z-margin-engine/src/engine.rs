//! The engine facade: ingest, rebuild, project and evaluate over one store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use z_margin_core::{
    Customer, CustomerId, DateRange, InsightFlag, MarginError, NormalizedEvent, Result, SourceKind,
};
use z_margin_store::Store;

use crate::aggregator;
use crate::config::EngineConfig;
use crate::insights;
use crate::normalizer::{NormalizedRecord, Normalizer};
use crate::projector::{self, Dashboard, FeatureMetricsView, TimeSeriesPoint};

/// Why a record in a batch was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestIssueKind {
    /// The record is valid but carries nothing to aggregate (unpaid, draft, zero).
    Ignored,
    /// Required fields were missing or unparsable.
    Malformed,
    /// The record linked to a customer that does not exist.
    UnknownCustomer,
}

/// One record that was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestIssue {
    /// Position of the record in the batch.
    pub index: usize,
    /// What went wrong.
    pub kind: IngestIssueKind,
    /// Human-readable reason.
    pub reason: String,
}

/// Outcome of ingesting one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Source the batch came from.
    pub source: SourceKind,
    /// Records in the batch.
    pub received: usize,
    /// New events appended to the log.
    pub accepted: usize,
    /// Events already in the log.
    pub duplicates: usize,
    /// Records skipped as carrying nothing to aggregate.
    pub ignored: usize,
    /// Records skipped as malformed.
    pub malformed: usize,
    /// Records skipped for an unresolvable customer reference.
    pub unknown_customers: usize,
    /// Customers created by this batch.
    pub customers_created: usize,
    /// Existing customers whose metadata changed.
    pub customers_updated: usize,
    /// Range rebuilt after the batch: every date carrying an accepted or
    /// duplicate event. `None` if the batch produced no events.
    pub rebuilt: Option<DateRange>,
    /// Every record that was not accepted.
    pub issues: Vec<IngestIssue>,
}

impl IngestReport {
    fn new(source: SourceKind, received: usize) -> Self {
        Self {
            source,
            received,
            accepted: 0,
            duplicates: 0,
            ignored: 0,
            malformed: 0,
            unknown_customers: 0,
            customers_created: 0,
            customers_updated: 0,
            rebuilt: None,
            issues: Vec::new(),
        }
    }

    /// Records dropped for data-quality reasons.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.malformed + self.unknown_customers
    }

    fn issue(&mut self, index: usize, kind: IngestIssueKind, reason: String) {
        match kind {
            IngestIssueKind::Ignored => self.ignored += 1,
            IngestIssueKind::Malformed => self.malformed += 1,
            IngestIssueKind::UnknownCustomer => self.unknown_customers += 1,
        }
        self.issues.push(IngestIssue {
            index,
            kind,
            reason,
        });
    }
}

/// Outcome of rebuilding a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Range that was rebuilt.
    pub range: DateRange,
    /// Events read from the log.
    pub events: usize,
    /// Aggregate rows written.
    pub aggregates: usize,
}

/// Event and customer counts for a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatistics {
    /// Range the event counts cover.
    pub range: DateRange,
    /// Usage events in range.
    pub usage_events: usize,
    /// Revenue events in range.
    pub revenue_events: usize,
    /// Events in range per source.
    pub events_by_source: BTreeMap<SourceKind, usize>,
    /// Customers known to the directory.
    pub total_customers: usize,
    /// Customers not deactivated.
    pub active_customers: usize,
}

/// Usage-vs-revenue engine over a [`Store`].
///
/// Operations that write to the store (ingestion, rebuilds, insight
/// evaluation, customer updates) run one at a time; reads do not wait.
pub struct MarginEngine {
    store: Arc<dyn Store>,
    config: EngineConfig,
    normalizer: Normalizer,
    writes: Mutex<()>,
}

impl MarginEngine {
    /// Create an engine over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        let normalizer = Normalizer::new(config.normalizer.clone());
        Self {
            store,
            config,
            normalizer,
            writes: Mutex::new(()),
        }
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Name of the storage backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// The default query range: `default_range_days` days ending at `today`.
    #[must_use]
    pub fn default_range(&self, today: NaiveDate) -> DateRange {
        DateRange::trailing(today, self.config.default_range_days)
    }

    /// Fill in missing bounds of a query range.
    ///
    /// A missing end is `today`; a missing start is the start of the default
    /// range ending at the end.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::InvalidRange` if `start > end` and
    /// `MarginError::RangeTooLarge` if the range covers more than
    /// `max_range_days` days.
    pub fn resolve_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<DateRange> {
        let end = end.unwrap_or(today);
        let start = start.unwrap_or_else(|| self.default_range(end).start);
        let range = DateRange::new(start, end)?;
        let days = range.len_days();
        if days > u64::from(self.config.max_range_days) {
            return Err(MarginError::RangeTooLarge {
                start,
                end,
                days,
                max_days: self.config.max_range_days,
            });
        }
        Ok(range)
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Normalize and append a batch of raw records from `source`, then rebuild
    /// the dates the batch's events fall on.
    ///
    /// Dates of duplicate events are rebuilt too, so retrying a batch whose
    /// rebuild failed repairs the aggregates. Data-quality problems are
    /// counted per record and never abort the batch.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn ingest(&self, source: SourceKind, records: &[Value]) -> Result<IngestReport> {
        let _writes = self.writes.lock();
        let mut report = IngestReport::new(source, records.len());
        let mut touched: Option<DateRange> = None;

        for (index, raw) in records.iter().enumerate() {
            let (event, resolution) =
                match self.normalizer.normalize(source, raw, self.store.as_ref()) {
                    Ok(NormalizedRecord::Event { event, resolution }) => (event, resolution),
                    Ok(NormalizedRecord::Ignored(reason)) => {
                        tracing::debug!(source = %source, index, reason = %reason, "Ignored record");
                        report.issue(index, IngestIssueKind::Ignored, reason);
                        continue;
                    }
                    Err(e @ MarginError::UnknownCustomerReference { .. }) => {
                        tracing::warn!(source = %source, index, error = %e, "Skipped record");
                        report.issue(index, IngestIssueKind::UnknownCustomer, e.to_string());
                        continue;
                    }
                    Err(e) if e.is_data_quality() => {
                        tracing::warn!(source = %source, index, error = %e, "Skipped record");
                        report.issue(index, IngestIssueKind::Malformed, e.to_string());
                        continue;
                    }
                    Err(e) => return Err(e),
                };

            if resolution.created {
                report.customers_created += 1;
            } else if resolution.updated {
                report.customers_updated += 1;
            }

            let day = DateRange::single(event.date());
            touched = Some(touched.map_or(day, |range| range.union(&day)));

            if self.store.insert_event(&event)? {
                report.accepted += 1;
            } else {
                tracing::debug!(
                    source = %source,
                    event_id = %event.event_id(),
                    "Duplicate event"
                );
                report.duplicates += 1;
            }
        }

        if let Some(range) = touched {
            self.rebuild_locked(&range)?;
            report.rebuilt = Some(range);
        }

        tracing::info!(
            source = %source,
            received = report.received,
            accepted = report.accepted,
            duplicates = report.duplicates,
            ignored = report.ignored,
            skipped = report.skipped(),
            customers_created = report.customers_created,
            "Ingested batch"
        );
        Ok(report)
    }

    // =========================================================================
    // Aggregation
    // =========================================================================

    /// Recompute every aggregate in `range` from the event log.
    ///
    /// Safe to retry: the range is overwritten in full.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn rebuild(&self, range: &DateRange) -> Result<RebuildReport> {
        let _writes = self.writes.lock();
        self.rebuild_locked(range)
    }

    /// Read, aggregate and replace `range`. The caller holds `writes`.
    fn rebuild_locked(&self, range: &DateRange) -> Result<RebuildReport> {
        let events = self.store.events_in_range(range)?;
        let rows = aggregator::aggregate(&events, range, self.config.revenue_join);
        self.store.replace_aggregates(range, &rows)?;

        tracing::info!(
            start = %range.start,
            end = %range.end,
            events = events.len(),
            aggregates = rows.len(),
            "Rebuilt aggregates"
        );
        Ok(RebuildReport {
            range: *range,
            events: events.len(),
            aggregates: rows.len(),
        })
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Summary, feature table and time series for `range`.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn dashboard(&self, range: &DateRange) -> Result<Dashboard> {
        let rows = self.store.aggregates_in_range(range)?;
        Ok(projector::dashboard(&rows, range))
    }

    /// Feature table for `range`.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn feature_metrics(&self, range: &DateRange) -> Result<FeatureMetricsView> {
        let rows = self.store.aggregates_in_range(range)?;
        Ok(projector::feature_metrics(&rows, range))
    }

    /// Daily series for `range`.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn time_series(&self, range: &DateRange) -> Result<Vec<TimeSeriesPoint>> {
        let rows = self.store.aggregates_in_range(range)?;
        Ok(projector::time_series(&rows, range))
    }

    // =========================================================================
    // Insights
    // =========================================================================

    /// Run the insight rules over the window ending at `as_of` and replace the
    /// stored insight set with the result.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn evaluate_insights(&self, as_of: DateTime<Utc>) -> Result<Vec<InsightFlag>> {
        let _writes = self.writes.lock();
        let window = DateRange::trailing(as_of.date_naive(), self.config.insight_window_days);
        let rows = self.store.aggregates_in_range(&window)?;
        let customers = self.store.list_customers()?;

        let flags = insights::evaluate(&rows, &customers, &self.config.thresholds, &window, as_of);
        self.store.replace_insights(&flags)?;

        tracing::info!(
            start = %window.start,
            end = %window.end,
            flags = flags.len(),
            "Evaluated insights"
        );
        Ok(flags)
    }

    /// The insight set from the latest evaluation.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn insights(&self) -> Result<Vec<InsightFlag>> {
        Ok(self.store.list_insights()?)
    }

    /// Event and customer counts for `range`.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn sync_statistics(&self, range: &DateRange) -> Result<SyncStatistics> {
        let events = self.store.events_in_range(range)?;
        let customers = self.store.list_customers()?;

        let mut stats = SyncStatistics {
            range: *range,
            usage_events: 0,
            revenue_events: 0,
            events_by_source: BTreeMap::new(),
            total_customers: customers.len(),
            active_customers: customers.iter().filter(|c| c.active).count(),
        };
        for event in &events {
            match event {
                NormalizedEvent::Usage(_) => stats.usage_events += 1,
                NormalizedEvent::Revenue(_) => stats.revenue_events += 1,
            }
            *stats.events_by_source.entry(event.source()).or_default() += 1;
        }
        Ok(stats)
    }

    // =========================================================================
    // Customers
    // =========================================================================

    /// Every known customer.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn customers(&self) -> Result<Vec<Customer>> {
        Ok(self.store.list_customers()?)
    }

    /// Deactivate a customer. Deactivating twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::CustomerNotFound` if the customer does not exist.
    pub fn deactivate_customer(&self, id: &CustomerId) -> Result<Customer> {
        let _writes = self.writes.lock();
        let mut customer = self.require_customer(id)?;
        if customer.deactivate() {
            self.store.update_customer(&customer)?;
            tracing::info!(customer_id = %id, "Deactivated customer");
        }
        Ok(customer)
    }

    /// Assign or clear a customer's usage limit.
    ///
    /// # Errors
    ///
    /// Returns `MarginError::CustomerNotFound` if the customer does not exist
    /// and `MarginError::Configuration` for a negative limit.
    pub fn set_usage_limit(&self, id: &CustomerId, limit: Option<Decimal>) -> Result<Customer> {
        if limit.is_some_and(|l| l < Decimal::ZERO) {
            return Err(MarginError::Configuration(
                "usage limit must not be negative".to_string(),
            ));
        }
        let _writes = self.writes.lock();
        let mut customer = self.require_customer(id)?;
        if customer.usage_limit != limit {
            customer.usage_limit = limit;
            customer.updated_at = Utc::now();
            self.store.update_customer(&customer)?;
            tracing::info!(customer_id = %id, limit = ?limit, "Set usage limit");
        }
        Ok(customer)
    }

    fn require_customer(&self, id: &CustomerId) -> Result<Customer> {
        self.store
            .get_customer(id)?
            .ok_or(MarginError::CustomerNotFound(*id))
    }
}
