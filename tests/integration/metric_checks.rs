//! Integration tests for metric checks against a mocked Prometheus
//!
//! These tests verify that:
//! - Threshold conditions require every sample in the window to match
//! - Backend errors and empty results evaluate to Unknown
//! - The caching runner only asks the backend for the missing part of a window

use std::sync::Arc;
use std::time::Duration;

use canopy::checks::{HealthCheckEvaluator, MetricCheckEvaluator};
use canopy::model::{CheckIdentifier, HealthStatus};
use canopy::query::{BackendQueryRunner, CachingQueryRunner, MetricQueryRunner};
use canopy::timeseries::{BackendKind, TimeSeriesClient};
use chrono::SecondsFormat;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{at, matrix_response, metric_definition};

fn identifier() -> CheckIdentifier {
    CheckIdentifier::new("prod", "acme", "api", "error-rate")
}

fn backend(server: &MockServer) -> Arc<BackendQueryRunner> {
    let client = TimeSeriesClient::new(BackendKind::Prometheus, server.uri(), Duration::from_secs(5), None).unwrap();
    Arc::new(BackendQueryRunner::new(client, Duration::from_secs(60)))
}

async fn respond_with(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v1/query_range"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_all_samples_above_threshold_match() {
    let server = MockServer::start().await;
    respond_with(&server, matrix_response(&[(0, 5.0), (60, i32::MAX as f64)])).await;

    let evaluator = MetricCheckEvaluator::new(backend(&server));
    let definition = metric_definition("rate(errors[1m])", 4.0, HealthStatus::Offline);

    let status = evaluator
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Offline);
}

#[tokio::test]
async fn test_one_sample_below_threshold_is_online() {
    let server = MockServer::start().await;
    respond_with(&server, matrix_response(&[(0, 5.0), (60, 4.0), (120, 3.0)])).await;

    let evaluator = MetricCheckEvaluator::new(backend(&server));
    let definition = metric_definition("rate(errors[1m])", 4.0, HealthStatus::Offline);

    let status = evaluator
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Online);
}

#[tokio::test]
async fn test_backend_error_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/query_range"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "status": "error",
            "errorType": "bad_data",
            "error": "parse error"
        })))
        .mount(&server)
        .await;

    let evaluator = MetricCheckEvaluator::new(backend(&server));
    let definition = metric_definition("rate(errors[1m]", 4.0, HealthStatus::Offline);

    let status = evaluator
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Unknown);
}

#[tokio::test]
async fn test_empty_result_is_unknown() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        serde_json::json!({
            "status": "success",
            "data": { "resultType": "matrix", "result": [] }
        }),
    )
    .await;

    let evaluator = MetricCheckEvaluator::new(backend(&server));
    let definition = metric_definition("up", 0.0, HealthStatus::Offline);

    let status = evaluator
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Unknown);
}

#[tokio::test]
async fn test_cache_fetches_only_delta_from_backend() {
    let server = MockServer::start().await;
    let rfc3339 = |seconds: i64| at(seconds).to_rfc3339_opts(SecondsFormat::Millis, true);

    // delta request for the second window starts where the first one ended
    Mock::given(method("GET"))
        .and(path("/api/v1/query_range"))
        .and(query_param("start", rfc3339(300).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(matrix_response(&[(300, 4.0), (360, 5.0)])))
        .expect(1)
        .mount(&server)
        .await;
    respond_with(
        &server,
        matrix_response(&[(0, 0.0), (60, 1.0), (120, 2.0), (180, 3.0), (240, 3.5), (300, 4.0)]),
    )
    .await;

    let runner = CachingQueryRunner::new(backend(&server));
    let cancel = CancellationToken::new();

    let first = runner
        .query_range(&identifier(), "up", at(0), at(300), &cancel)
        .await
        .unwrap();
    assert_eq!(first.len(), 6);

    let second = runner
        .query_range(&identifier(), "up", at(60), at(360), &cancel)
        .await
        .unwrap();
    let values: Vec<f64> = second.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 3.5, 4.0, 5.0]);

    // a disjoint window is fetched in full again
    let third = runner
        .query_range(&identifier(), "up", at(1000), at(1300), &cancel)
        .await
        .unwrap();
    assert_eq!(third.len(), 6);

    let requests = server.received_requests().await.unwrap();
    let starts: Vec<String> = requests
        .iter()
        .filter_map(|request| {
            request
                .url
                .query_pairs()
                .find(|(key, _)| key == "start")
                .map(|(_, value)| value.into_owned())
        })
        .collect();
    assert_eq!(starts, vec![rfc3339(0), rfc3339(300), rfc3339(1000)]);
}
