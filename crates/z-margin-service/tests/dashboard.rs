//! Dashboard view integration tests.

mod common;

use axum::http::StatusCode;
use common::{usage, TestHarness};
use rust_decimal::Decimal;
use serde_json::{json, Value};

fn dec(value: &Value) -> Decimal {
    value.as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn dashboard_for_worked_example() {
    let harness = TestHarness::new();
    harness
        .ingest(
            "metering",
            json!([usage("acme", "gpt-4", 100, "0.002", "2024-01-01")]),
        )
        .await;
    harness
        .ingest(
            "metering",
            json!({"records": [usage("acme", "chat", 1, "0", "2024-01-01")]}),
        )
        .await;
    let customers: Value = harness.server.get("/v1/customers").await.json();
    let acme = customers["customers"][0]["id"].as_str().unwrap().to_string();
    // Revenue attributed to gpt-4 joins that feature's usage bucket.
    harness
        .ingest(
            "stripe",
            json!([{
                "object": "charge",
                "id": "ch_1",
                "customer": "cus_acme",
                "amount": 5000,
                "currency": "usd",
                "paid": true,
                "created": 1_704_110_400,
                "metadata": {"customer_ref": acme, "feature": "gpt-4"},
            }]),
        )
        .await;

    let response = harness
        .server
        .get("/v1/dashboard")
        .add_query_param("start_date", "2024-01-01")
        .add_query_param("end_date", "2024-01-01")
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(dec(&body["summary"]["total_usage_cost"]), dec(&json!("0.20")));
    assert_eq!(dec(&body["summary"]["total_revenue"]), dec(&json!("50")));
    assert_eq!(dec(&body["summary"]["total_profit"]), dec(&json!("49.80")));
    assert_eq!(
        dec(&body["summary"]["profit_margin_percentage"]),
        dec(&json!("99.6"))
    );
    assert_eq!(body["summary"]["start_date"], "2024-01-01");
    assert_eq!(body["time_series"].as_array().unwrap().len(), 1);

    let features = body["feature_metrics"].as_array().unwrap();
    assert_eq!(features.len(), 2);
    assert_eq!(features[1]["feature"], "gpt-4");
    assert_eq!(dec(&features[1]["revenue"]), dec(&json!("50")));
}

#[tokio::test]
async fn empty_range_is_zero_filled() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/timeseries")
        .add_query_param("start_date", "2024-02-01")
        .add_query_param("end_date", "2024-02-29")
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let points = body["points"].as_array().unwrap();
    assert_eq!(points.len(), 29);
    assert!(points.iter().all(|p| dec(&p["revenue"]).is_zero()));
}

#[tokio::test]
async fn default_range_is_thirty_days() {
    let harness = TestHarness::new();

    let body: Value = harness.server.get("/v1/timeseries").await.json();
    assert_eq!(body["points"].as_array().unwrap().len(), 30);
}

#[tokio::test]
async fn reversed_range_is_invalid_range() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/features")
        .add_query_param("start_date", "2024-02-01")
        .add_query_param("end_date", "2024-01-01")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_range");
}

#[tokio::test]
async fn unparsable_date_is_bad_request() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/dashboard")
        .add_query_param("start_date", "January 1st")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn oversized_range_is_bad_request() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/dashboard")
        .add_query_param("start_date", "0001-01-01")
        .add_query_param("end_date", "9999-12-31")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");

    let response = harness
        .server
        .get("/v1/dashboard")
        .add_query_param("start_date", "2024-01-01")
        .add_query_param("end_date", "2024-12-31")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["time_series"].as_array().unwrap().len(), 366);
}
