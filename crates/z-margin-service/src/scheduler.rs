//! Periodic recomputation.
//!
//! Two independent tasks: one rebuilds the default range of aggregates, the
//! other re-runs the insight rules. Failures are logged and retried on the
//! next tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use z_margin_engine::MarginEngine;

use crate::config::ServiceConfig;

/// Handles of the spawned tasks.
#[derive(Debug)]
pub struct Scheduler {
    /// Aggregate rebuild task.
    pub aggregation: JoinHandle<()>,
    /// Insight evaluation task.
    pub insights: JoinHandle<()>,
}

impl Scheduler {
    /// Stop both tasks.
    pub fn abort(&self) {
        self.aggregation.abort();
        self.insights.abort();
    }
}

/// Spawn the periodic tasks. Each runs once immediately, then every interval.
#[must_use]
pub fn spawn(engine: Arc<MarginEngine>, config: &ServiceConfig) -> Scheduler {
    let aggregation_every = Duration::from_secs(config.aggregation_interval_seconds.max(1));
    let insights_every = Duration::from_secs(config.insight_interval_seconds.max(1));

    tracing::info!(
        aggregation_interval_seconds = aggregation_every.as_secs(),
        insight_interval_seconds = insights_every.as_secs(),
        "Starting scheduler"
    );

    let aggregation = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut ticker = interval(aggregation_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                run_aggregation(&engine);
            }
        })
    };

    let insights = tokio::spawn(async move {
        let mut ticker = interval(insights_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            run_insights(&engine);
        }
    });

    Scheduler {
        aggregation,
        insights,
    }
}

/// Rebuild the default range ending today.
pub fn run_aggregation(engine: &MarginEngine) {
    let range = engine.default_range(Utc::now().date_naive());
    if let Err(e) = engine.rebuild(&range) {
        tracing::error!(
            error = %e,
            start = %range.start,
            end = %range.end,
            "Scheduled rebuild failed"
        );
    }
}

/// Re-run the insight rules as of now.
pub fn run_insights(engine: &MarginEngine) {
    if let Err(e) = engine.evaluate_insights(Utc::now()) {
        tracing::error!(error = %e, "Scheduled insight evaluation failed");
    }
}
