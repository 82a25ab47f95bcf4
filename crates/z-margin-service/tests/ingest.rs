//! Ingestion integration tests.

mod common;

use axum::http::StatusCode;
use common::{usage, TestHarness};
use serde_json::{json, Value};

#[tokio::test]
async fn ingest_requires_api_key() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/ingest/metering")
        .json(&json!([usage("acme", "gpt-4", 1, "0.1", "2024-01-01")]))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = harness
        .server
        .post("/v1/ingest/metering")
        .add_header(
            axum::http::HeaderName::from_static("x-api-key"),
            axum::http::HeaderValue::from_static("wrong-key"),
        )
        .json(&json!([]))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_source_is_bad_request() {
    let harness = TestHarness::new();
    let (name, value) = harness.api_key_header();

    let response = harness
        .server
        .post("/v1/ingest/salesforce")
        .add_header(name, value)
        .json(&json!([]))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_records_are_counted_not_fatal() {
    let harness = TestHarness::new();

    let mut records: Vec<Value> = (1..=10)
        .map(|day| usage("acme", "gpt-4", 10, "0.01", &format!("2024-01-{day:02}")))
        .collect();
    records.push(json!({"customer_id": "acme", "feature": "gpt-4", "timestamp": "2024-01-03"}));

    let report = harness.ingest("metering", Value::Array(records)).await;
    assert_eq!(report["received"], 11);
    assert_eq!(report["accepted"], 10);
    assert_eq!(report["malformed"], 1);
    assert_eq!(report["issues"][0]["index"], 10);
    assert_eq!(report["issues"][0]["kind"], "malformed");
    assert_eq!(report["rebuilt"]["start"], "2024-01-01");
    assert_eq!(report["rebuilt"]["end"], "2024-01-10");
}

#[tokio::test]
async fn duplicate_batch_is_idempotent() {
    let harness = TestHarness::new();
    let batch = json!([
        {"object": "charge", "id": "ch_1", "customer": "cus_1", "amount": 1000, "currency": "usd", "paid": true, "created": 1_704_067_200},
        {"object": "charge", "id": "ch_2", "customer": "cus_1", "amount": 0, "currency": "usd", "paid": true, "created": 1_704_067_200},
        {"object": "charge", "id": "ch_3", "customer": "cus_1", "amount": 700, "currency": "eur", "paid": true, "created": 1_704_067_200},
    ]);

    let first = harness.ingest("stripe", batch.clone()).await;
    assert_eq!(first["accepted"], 1);
    assert_eq!(first["ignored"], 1);
    assert_eq!(first["malformed"], 1);
    assert_eq!(first["customers_created"], 1);

    let second = harness.ingest("stripe", batch).await;
    assert_eq!(second["accepted"], 0);
    assert_eq!(second["duplicates"], 1);
    assert_eq!(second["rebuilt"]["start"], "2024-01-01");
    assert_eq!(second["rebuilt"]["end"], "2024-01-01");
}

#[tokio::test]
async fn sync_statistics_and_rebuild() {
    let harness = TestHarness::new();
    harness
        .ingest(
            "metering",
            json!([
                usage("acme", "gpt-4", 10, "0.01", "2024-01-01"),
                usage("globex", "gpt-4", 10, "0.01", "2024-01-02"),
            ]),
        )
        .await;

    let response = harness
        .server
        .get("/v1/ingest/stats")
        .add_query_param("start_date", "2024-01-01")
        .add_query_param("end_date", "2024-01-31")
        .await;
    response.assert_status_ok();
    let stats: Value = response.json();
    assert_eq!(stats["usage_events"], 2);
    assert_eq!(stats["revenue_events"], 0);
    assert_eq!(stats["events_by_source"]["metering"], 2);
    assert_eq!(stats["total_customers"], 2);

    let (name, value) = harness.api_key_header();
    let response = harness
        .server
        .post("/v1/aggregates/rebuild")
        .add_header(name, value)
        .json(&json!({"start_date": "2024-01-01", "end_date": "2024-01-31"}))
        .await;
    response.assert_status_ok();
    let rebuilt: Value = response.json();
    assert_eq!(rebuilt["events"], 2);
    assert_eq!(rebuilt["aggregates"], 2);
}
