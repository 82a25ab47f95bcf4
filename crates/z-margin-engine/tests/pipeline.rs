//! End-to-end tests: raw records through ingest, rebuild, views and insights.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use z_margin_core::{DateRange, InsightRule, Severity, SourceKind};
use z_margin_engine::{EngineConfig, MarginEngine};
use z_margin_store::{MemoryStore, Store};

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn engine_with_store() -> (MarginEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = MarginEngine::new(store.clone(), EngineConfig::default());
    (engine, store)
}

fn january() -> DateRange {
    DateRange::parse("2024-01-01", "2024-01-31").unwrap()
}

fn usage(customer: &str, feature: &str, quantity: u64, day: u32) -> Value {
    json!({
        "event_id": format!("{customer}-{feature}-{day}-{quantity}"),
        "customer_id": customer,
        "feature": feature,
        "quantity": quantity,
        "unit_cost": "0.002",
        "timestamp": format!("2024-01-{day:02}T12:00:00Z"),
    })
}

#[test]
fn customer_totals_for_usage_and_charge() {
    let (engine, _) = engine_with_store();
    let report = engine
        .ingest(
            SourceKind::Metering,
            &[json!({
                "customer_id": "cus_c1",
                "feature": "gpt-4",
                "quantity": 100,
                "unit_cost": "0.002",
                "timestamp": "2024-01-01T08:00:00Z",
            })],
        )
        .unwrap();
    assert_eq!(report.accepted, 1);

    // Link the Stripe customer to the metering customer so revenue joins.
    let c1 = engine.customers().unwrap()[0].id;
    let report = engine
        .ingest(
            SourceKind::Stripe,
            &[json!({
                "object": "charge",
                "id": "ch_1",
                "customer": "cus_c1",
                "amount": 5000,
                "currency": "usd",
                "paid": true,
                "created": 1_704_110_400,
                "metadata": {"customer_ref": c1.to_string()},
            })],
        )
        .unwrap();
    assert_eq!(report.accepted, 1);
    assert_eq!(engine.customers().unwrap().len(), 1);

    let day = DateRange::parse("2024-01-01", "2024-01-01").unwrap();
    let summary = engine.dashboard(&day).unwrap().summary;
    assert_eq!(summary.total_usage_cost, d("0.20"));
    assert_eq!(summary.total_revenue, d("50.00"));
    assert_eq!(summary.total_profit, d("49.80"));
    assert_eq!(summary.profit_margin_percentage, d("99.6"));
}

#[test]
fn malformed_record_does_not_change_aggregates() {
    let valid: Vec<Value> = (1..=10)
        .map(|day| usage("acme", "gpt-4", 10 * u64::from(day), day))
        .collect();
    let mut with_bad = valid.clone();
    with_bad.insert(
        4,
        json!({"customer_id": "acme", "feature": "gpt-4", "quantity": "lots", "timestamp": "2024-01-05"}),
    );

    let (clean, clean_store) = engine_with_store();
    clean.ingest(SourceKind::Metering, &valid).unwrap();

    let (dirty, dirty_store) = engine_with_store();
    let report = dirty.ingest(SourceKind::Metering, &with_bad).unwrap();
    assert_eq!(report.accepted, 10);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.issues[0].index, 4);

    let strip = |store: &MemoryStore| -> Vec<(Option<String>, chrono::NaiveDate, Decimal, Decimal)> {
        store
            .aggregates_in_range(&january())
            .unwrap()
            .into_iter()
            .map(|row| (row.feature, row.date, row.usage_quantity, row.usage_cost))
            .collect()
    };
    assert_eq!(strip(clean_store.as_ref()), strip(dirty_store.as_ref()));
    assert_eq!(
        clean.dashboard(&january()).unwrap().summary,
        dirty.dashboard(&january()).unwrap().summary
    );
}

#[test]
fn amounts_beyond_decimal_range_are_skipped() {
    let (engine, store) = engine_with_store();
    let report = engine
        .ingest(
            SourceKind::Metering,
            &[
                json!({"customer_id": "acme", "feature": "gpt-4", "quantity": "50000000000000000000000000000", "unit_cost": "2", "timestamp": "2024-01-01"}),
                usage("acme", "gpt-4", 100, 1),
            ],
        )
        .unwrap();
    assert_eq!(report.accepted, 1);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.issues[0].index, 0);

    let report = engine
        .ingest(
            SourceKind::OpenAi,
            &[json!({
                "project_id": "proj_1",
                "model": "gpt-4",
                "input_tokens": "79228162514264337593543950335",
                "output_tokens": "1",
                "start_time": 1_704_067_200,
            })],
        )
        .unwrap();
    assert_eq!(report.accepted, 0);
    assert_eq!(report.malformed, 1);

    let day = DateRange::parse("2024-01-01", "2024-01-01").unwrap();
    assert_eq!(store.events_in_range(&day).unwrap().len(), 1);
    assert_eq!(engine.dashboard(&day).unwrap().summary.total_usage_cost, d("0.2"));
}

#[test]
fn reingesting_a_batch_is_idempotent() {
    let (engine, store) = engine_with_store();
    let batch: Vec<Value> = (1..=5).map(|day| usage("acme", "gpt-4", 100, day)).collect();

    engine.ingest(SourceKind::Metering, &batch).unwrap();
    let before = store.aggregates_in_range(&january()).unwrap();

    let again = engine.ingest(SourceKind::Metering, &batch).unwrap();
    assert_eq!(again.accepted, 0);
    assert_eq!(again.duplicates, 5);
    assert_eq!(
        again.rebuilt,
        Some(DateRange::parse("2024-01-01", "2024-01-05").unwrap())
    );
    assert_eq!(store.aggregates_in_range(&january()).unwrap(), before);

    engine.rebuild(&january()).unwrap();
    let report = engine.rebuild(&january()).unwrap();
    assert_eq!(report.events, 5);
    assert_eq!(store.aggregates_in_range(&january()).unwrap(), before);
}

#[test]
fn views_agree_with_each_other() {
    let (engine, _) = engine_with_store();
    let mut batch: Vec<Value> = Vec::new();
    for day in [2, 9, 17, 30] {
        batch.push(usage("acme", "gpt-4", 500, day));
        batch.push(usage("globex", "embedding-v1", 2000, day));
    }
    engine.ingest(SourceKind::Metering, &batch).unwrap();
    engine
        .ingest(
            SourceKind::Lago,
            &[json!({
                "invoice": {
                    "lago_id": "inv_1",
                    "status": "finalized",
                    "payment_status": "succeeded",
                    "external_customer_id": "globex",
                    "total_amount_cents": 1250,
                    "currency": "USD",
                    "issuing_date": "2024-01-15",
                }
            })],
        )
        .unwrap();

    let dashboard = engine.dashboard(&january()).unwrap();
    assert_eq!(dashboard.time_series.len(), 31);

    let series_cost: Decimal = dashboard.time_series.iter().map(|p| p.usage_cost).sum();
    let series_revenue: Decimal = dashboard.time_series.iter().map(|p| p.revenue).sum();
    assert_eq!(series_cost, dashboard.summary.total_usage_cost);
    assert_eq!(series_revenue, dashboard.summary.total_revenue);

    let view = engine.feature_metrics(&january()).unwrap();
    let feature_revenue: Decimal = view.features.iter().map(|f| f.revenue).sum();
    assert_eq!(
        feature_revenue + view.unattributed_revenue,
        view.summary.total_revenue
    );
    let feature_cost: Decimal = view.features.iter().map(|f| f.total_cost).sum();
    assert_eq!(feature_cost, view.summary.total_usage_cost);
}

#[test]
fn empty_range_yields_zero_filled_views() {
    let (engine, _) = engine_with_store();
    let range = DateRange::parse("2030-03-01", "2030-03-10").unwrap();

    let dashboard = engine.dashboard(&range).unwrap();
    assert_eq!(dashboard.time_series.len(), 10);
    assert_eq!(dashboard.summary.total_revenue, Decimal::ZERO);
    assert_eq!(dashboard.summary.profit_margin_percentage, Decimal::ZERO);
    assert!(dashboard.feature_metrics.is_empty());
}

#[test]
fn insights_flag_losing_feature() {
    let (engine, _) = engine_with_store();
    engine
        .ingest(
            SourceKind::Metering,
            &[json!({
                "customer_id": "acme",
                "feature": "image-gen",
                "quantity": 1000,
                "unit_cost": "0.1",
                "timestamp": "2024-01-20",
            })],
        )
        .unwrap();
    engine
        .ingest(
            SourceKind::Metering,
            &[json!({
                "customer_id": "acme",
                "feature": "chat",
                "quantity": 1,
                "unit_cost": "0",
                "timestamp": "2024-01-20",
            })],
        )
        .unwrap();
    // Revenue attributed to the feature: cost 100, revenue 50.
    engine
        .ingest(
            SourceKind::Stripe,
            &[json!({
                "type": "charge.succeeded",
                "data": {"object": {
                    "object": "charge",
                    "id": "ch_img",
                    "customer": "cus_acme",
                    "amount": 5000,
                    "currency": "usd",
                    "paid": true,
                    "created": 1_705_752_000,
                    "metadata": {"feature": "image-gen"},
                }},
            })],
        )
        .unwrap();

    let as_of = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
    let flags = engine.evaluate_insights(as_of).unwrap();
    let losing: Vec<_> = flags
        .iter()
        .filter(|f| f.rule == InsightRule::UnprofitableFeature)
        .collect();
    assert_eq!(losing.len(), 1);
    assert_eq!(losing[0].subject, "image-gen");
    assert_eq!(losing[0].severity, Severity::Critical);
    assert_eq!(engine.insights().unwrap().len(), flags.len());
}
