//! Integration tests for HTTP health checks
//!
//! These tests verify that:
//! - Status code, response time and body conditions are applied to real responses
//! - Network failures and timeouts map to Offline
//! - Redirect and authorization settings are honoured
//! - Cancellation maps to Unknown

use std::time::Duration;

use canopy::checks::{HealthCheckEvaluator, HttpCheckEvaluator};
use canopy::model::{CheckIdentifier, HealthStatus, HttpCondition};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{expect_codes, http_definition};

fn identifier() -> CheckIdentifier {
    CheckIdentifier::new("prod", "acme", "api", "health")
}

fn evaluator(timeout: Duration) -> HttpCheckEvaluator {
    HttpCheckEvaluator::new(timeout).unwrap()
}

async fn mock(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_listed_status_code_is_online() {
    let server = MockServer::start().await;
    mock(&server, "/health", ResponseTemplate::new(200)).await;

    let definition = http_definition(format!("{}/health", server.uri()), vec![expect_codes(&[200])]);
    let status = evaluator(Duration::from_secs(5))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Online);
}

#[tokio::test]
async fn test_unlisted_status_code_is_offline() {
    let server = MockServer::start().await;
    mock(&server, "/health", ResponseTemplate::new(500)).await;

    let definition = http_definition(format!("{}/health", server.uri()), vec![expect_codes(&[200])]);
    let status = evaluator(Duration::from_secs(5))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Offline);
}

#[tokio::test]
async fn test_most_severe_of_matching_conditions() {
    let server = MockServer::start().await;
    mock(&server, "/health", ResponseTemplate::new(503)).await;

    let definition = http_definition(
        format!("{}/health", server.uri()),
        vec![
            HttpCondition::StatusCode {
                status_codes: vec![503],
                status: HealthStatus::AtRisk,
            },
            HttpCondition::ResponseTime {
                response_time: Duration::ZERO,
                status: HealthStatus::Degraded,
            },
        ],
    );
    let status = evaluator(Duration::from_secs(5))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::AtRisk);
}

#[tokio::test]
async fn test_json_body_condition() {
    let server = MockServer::start().await;
    mock(
        &server,
        "/status",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "database": { "state": "degraded" },
            "queue": { "state": "ok" }
        })),
    )
    .await;

    let definition = http_definition(
        format!("{}/status", server.uri()),
        vec![
            expect_codes(&[200]),
            HttpCondition::HttpBodyJson {
                path: "$.database.state".to_string(),
                value: "^degraded$".to_string(),
                status: HealthStatus::Degraded,
            },
        ],
    );
    let status = evaluator(Duration::from_secs(5))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_xml_body_condition() {
    let server = MockServer::start().await;
    mock(
        &server,
        "/status.xml",
        ResponseTemplate::new(200)
            .set_body_string("<health><status>maintenance</status></health>")
            .insert_header("content-type", "application/xml"),
    )
    .await;

    let definition = http_definition(
        format!("{}/status.xml", server.uri()),
        vec![HttpCondition::HttpBodyXml {
            path: "/health/status".to_string(),
            value: "maintenance".to_string(),
            status: HealthStatus::AtRisk,
        }],
    );
    let status = evaluator(Duration::from_secs(5))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::AtRisk);
}

#[tokio::test]
async fn test_malformed_json_is_unknown() {
    let server = MockServer::start().await;
    mock(&server, "/status", ResponseTemplate::new(200).set_body_string("not json")).await;

    let definition = http_definition(
        format!("{}/status", server.uri()),
        vec![HttpCondition::HttpBodyJson {
            path: "$.state".to_string(),
            value: "ok".to_string(),
            status: HealthStatus::Online,
        }],
    );
    let status = evaluator(Duration::from_secs(5))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Unknown);
}

#[tokio::test]
async fn test_timeout_is_offline() {
    let server = MockServer::start().await;
    mock(
        &server,
        "/slow",
        ResponseTemplate::new(200).set_delay(Duration::from_secs(3)),
    )
    .await;

    let definition = http_definition(format!("{}/slow", server.uri()), vec![expect_codes(&[200])]);
    let status = evaluator(Duration::from_millis(200))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Offline);
}

#[tokio::test]
async fn test_unreachable_host_is_offline() {
    // Bind and drop a listener to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let definition = http_definition(format!("http://{addr}/health"), vec![expect_codes(&[200])]);
    let status = evaluator(Duration::from_secs(2))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Offline);
}

#[tokio::test]
async fn test_redirects_are_not_followed_when_disabled() {
    let server = MockServer::start().await;
    mock(
        &server,
        "/old",
        ResponseTemplate::new(302).insert_header("location", format!("{}/new", server.uri()).as_str()),
    )
    .await;
    mock(&server, "/new", ResponseTemplate::new(200)).await;

    let mut definition = http_definition(format!("{}/old", server.uri()), vec![expect_codes(&[200])]);
    let followed = evaluator(Duration::from_secs(5))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;
    assert_eq!(followed, HealthStatus::Online);

    definition.follow_redirects = false;
    let not_followed = evaluator(Duration::from_secs(5))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;
    assert_eq!(not_followed, HealthStatus::Offline);
}

#[tokio::test]
async fn test_authorization_header_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("authorization", "Basic c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    mock(&server, "/private", ResponseTemplate::new(401)).await;

    let mut definition = http_definition(format!("{}/private", server.uri()), vec![expect_codes(&[200])]);
    definition.authorization_header = Some("Basic c2VjcmV0".to_string());

    let status = evaluator(Duration::from_secs(5))
        .evaluate(&identifier(), &definition, &CancellationToken::new())
        .await;

    assert_eq!(status, HealthStatus::Online);
}

#[tokio::test]
async fn test_cancelled_evaluation_is_unknown() {
    let server = MockServer::start().await;
    mock(
        &server,
        "/slow",
        ResponseTemplate::new(200).set_delay(Duration::from_secs(10)),
    )
    .await;

    let definition = http_definition(format!("{}/slow", server.uri()), vec![expect_codes(&[200])]);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let status = tokio::time::timeout(
        Duration::from_secs(5),
        evaluator(Duration::from_secs(30)).evaluate(&identifier(), &definition, &cancel),
    )
    .await
    .unwrap();

    assert_eq!(status, HealthStatus::Unknown);
}
