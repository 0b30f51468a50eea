//! Integration tests for the agent's tenant monitor against a mocked hub
//!
//! These tests verify that:
//! - A full cycle fetches the tenant, runs its checks and posts one report per service
//! - A service shared by two parents is checked and smoothed once per cycle
//! - A removed tenant ends the monitor
//! - A rejected token is fatal
//! - Other hub failures skip the cycle and file an error report

use std::sync::Arc;
use std::time::Duration;

use canopy::agent::{CycleOutcome, HttpStatusApiClient, StatusApi, TenantMonitor};
use canopy::checks::{CheckEvaluator, HttpCheckEvaluator};
use canopy::model::{HealthStatus, ServiceHealthReport};
use canopy::scheduler::{HealthCheckScheduler, SchedulerHandle, SharedEvaluator};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{expect_codes, http_check, service, tenant};

const TENANT_PATH: &str = "/api/v1/prod/tenants/acme";

/// Scheduler running in the background until the returned token is cancelled.
fn start_scheduler() -> (SchedulerHandle, CancellationToken) {
    let scheduler = HealthCheckScheduler::new(4);
    let handle = scheduler.handle();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move { scheduler.run(token).await });
    (handle, cancel)
}

fn monitor(hub: &MockServer, scheduler: SchedulerHandle) -> TenantMonitor {
    monitor_with_tolerance(hub, scheduler, 0)
}

fn monitor_with_tolerance(hub: &MockServer, scheduler: SchedulerHandle, tolerance: u32) -> TenantMonitor {
    let api: Arc<dyn StatusApi> = Arc::new(
        HttpStatusApiClient::new(hub.uri(), Duration::from_secs(5), Some("agent-token".to_string())).unwrap(),
    );
    let evaluator: SharedEvaluator = Arc::new(CheckEvaluator::new(Arc::new(
        HttpCheckEvaluator::new(Duration::from_secs(5)).unwrap(),
    )));
    TenantMonitor::new("prod", "acme", api, scheduler, evaluator, Duration::from_secs(30), tolerance)
}

async fn serve_tenant(hub: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path(TENANT_PATH))
        .respond_with(ResponseTemplate::new(status))
        .mount(hub)
        .await;
}

#[tokio::test]
async fn test_cycle_posts_one_report_per_service() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&target)
        .await;

    let configuration = tenant(
        vec![
            service(
                "api",
                vec![
                    http_check("live", format!("{}/up", target.uri()), vec![expect_codes(&[200])]),
                    http_check("ready", format!("{}/down", target.uri()), vec![expect_codes(&[200])]),
                ],
                &["db"],
            ),
            service(
                "db",
                vec![http_check("ping", format!("{}/up", target.uri()), vec![expect_codes(&[200])])],
                &[],
            ),
        ],
        &["api"],
    );

    let hub = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TENANT_PATH))
        .and(header("authorization", "Bearer agent-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&configuration))
        .mount(&hub)
        .await;
    for name in ["api", "db"] {
        Mock::given(method("POST"))
            .and(path(format!("{TENANT_PATH}/services/{name}/health")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&hub)
            .await;
    }

    let (scheduler, stop) = start_scheduler();
    let outcome = monitor(&hub, scheduler)
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();
    stop.cancel();

    assert_eq!(outcome, CycleOutcome::Reported(2));

    let reports: Vec<(String, ServiceHealthReport)> = hub
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.method.as_str() == "POST")
        .map(|request| (request.url.path().to_string(), serde_json::from_slice(&request.body).unwrap()))
        .collect();
    assert_eq!(reports.len(), 2);

    for (url, report) in reports {
        if url.ends_with("/services/api/health") {
            assert_eq!(report.aggregate_status, HealthStatus::Offline);
            assert_eq!(report.health_checks["live"], HealthStatus::Online);
            assert_eq!(report.health_checks["ready"], HealthStatus::Offline);
        } else {
            assert_eq!(report.aggregate_status, HealthStatus::Online);
            assert_eq!(report.health_checks.len(), 1);
        }
    }
}

#[tokio::test]
async fn test_shared_child_is_checked_once_per_cycle() {
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/up"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;
    // db answers once, then fails
    Mock::given(method("GET"))
        .and(path("/db"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .mount(&target)
        .await;
    Mock::given(method("GET"))
        .and(path("/db"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&target)
        .await;

    let up = || vec![http_check("live", format!("{}/up", target.uri()), vec![expect_codes(&[200])])];
    let configuration = tenant(
        vec![
            service("api", up(), &["db"]),
            service("web", up(), &["db"]),
            service(
                "db",
                vec![http_check("ping", format!("{}/db", target.uri()), vec![expect_codes(&[200])])],
                &[],
            ),
        ],
        &["api", "web"],
    );

    let hub = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TENANT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(&configuration))
        .mount(&hub)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&hub)
        .await;

    let (scheduler, stop) = start_scheduler();
    let mut monitor = monitor_with_tolerance(&hub, scheduler, 1);
    let cancel = CancellationToken::new();
    assert_eq!(monitor.run_cycle(&cancel).await.unwrap(), CycleOutcome::Reported(3));
    assert_eq!(monitor.run_cycle(&cancel).await.unwrap(), CycleOutcome::Reported(3));
    stop.cancel();

    let db_requests = target
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/db")
        .count();
    assert_eq!(db_requests, 2);

    // the single failure is still held back by a tolerance of one
    let db_reports: Vec<ServiceHealthReport> = hub
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path().ends_with("/services/db/health"))
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect();
    assert_eq!(db_reports.len(), 2);
    assert_eq!(db_reports[1].health_checks["ping"], HealthStatus::Online);
}

#[tokio::test]
async fn test_removed_tenant_stops_monitor() {
    let hub = MockServer::start().await;
    serve_tenant(&hub, 404).await;

    let (scheduler, stop) = start_scheduler();
    let mut monitor = monitor(&hub, scheduler);
    assert_eq!(
        monitor.run_cycle(&CancellationToken::new()).await.unwrap(),
        CycleOutcome::TenantRemoved
    );

    let result = tokio::time::timeout(Duration::from_secs(5), monitor.run(CancellationToken::new()))
        .await
        .unwrap();
    stop.cancel();

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_rejected_token_is_fatal() {
    let hub = MockServer::start().await;
    serve_tenant(&hub, 401).await;

    let (scheduler, stop) = start_scheduler();
    let result = monitor(&hub, scheduler).run_cycle(&CancellationToken::new()).await;
    stop.cancel();

    assert!(result.is_err());
}

#[tokio::test]
async fn test_hub_failure_skips_cycle_and_reports_error() {
    let hub = MockServer::start().await;
    serve_tenant(&hub, 500).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/prod/error-reports"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&hub)
        .await;

    let (scheduler, stop) = start_scheduler();
    let outcome = monitor(&hub, scheduler)
        .run_cycle(&CancellationToken::new())
        .await
        .unwrap();
    stop.cancel();

    assert_eq!(outcome, CycleOutcome::Skipped);

    let requests = hub.received_requests().await.unwrap();
    let report: serde_json::Value = requests
        .iter()
        .find(|request| request.method.as_str() == "POST")
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .unwrap();
    assert_eq!(report["tenant"], "acme");
    assert_eq!(report["level"], "Error");
}
