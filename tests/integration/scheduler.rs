//! Integration tests for the bounded-concurrency scheduler
//!
//! These tests verify that:
//! - No more than `max_concurrency` evaluations run at once
//! - Every queued check completes
//! - Tenants are served round-robin

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use canopy::checks::HealthCheckEvaluator;
use canopy::model::{CheckIdentifier, HealthCheckDefinition, HealthStatus};
use canopy::scheduler::{HealthCheckScheduler, SchedulerError, SharedEvaluator};
use futures::future::join_all;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::helpers::http_check;

#[derive(Default)]
struct TrackingEvaluator {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    order: Mutex<Vec<String>>,
}

#[async_trait]
impl HealthCheckEvaluator<HealthCheckDefinition> for TrackingEvaluator {
    async fn evaluate(
        &self,
        identifier: &CheckIdentifier,
        _: &HealthCheckDefinition,
        _: &CancellationToken,
    ) -> HealthStatus {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.order.lock().push(identifier.tenant().to_string());

        tokio::time::sleep(Duration::from_millis(20)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        HealthStatus::Online
    }
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let tracker = Arc::new(TrackingEvaluator::default());
    let evaluator: SharedEvaluator = tracker.clone();
    let scheduler = HealthCheckScheduler::new(3);
    let handle = scheduler.handle();
    let cancel = CancellationToken::new();

    let runner = {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let check = Arc::new(http_check("health", "http://localhost", vec![]));
    let pending: Vec<_> = (0..20)
        .map(|i| {
            let tenant = format!("tenant-{}", i % 4);
            let identifier = CheckIdentifier::new("prod", &tenant, "api", format!("check-{i}"));
            handle.queue_health_check(&tenant, identifier, check.clone(), evaluator.clone())
        })
        .collect();

    let statuses = tokio::time::timeout(Duration::from_secs(10), join_all(pending))
        .await
        .unwrap();

    assert_eq!(statuses.len(), 20);
    assert!(statuses.iter().all(|status| *status == HealthStatus::Online));
    assert!(tracker.max_in_flight.load(Ordering::SeqCst) <= 3);

    cancel.cancel();
    assert_eq!(runner.await.unwrap(), Err(SchedulerError::Cancelled));
}

#[tokio::test]
async fn test_tenants_are_served_round_robin() {
    let tracker = Arc::new(TrackingEvaluator::default());
    let evaluator: SharedEvaluator = tracker.clone();
    let scheduler = HealthCheckScheduler::new(1);
    let handle = scheduler.handle();

    let check = Arc::new(http_check("health", "http://localhost", vec![]));
    let mut pending = Vec::new();
    for (tenant, count) in [("a", 4), ("b", 2)] {
        for i in 0..count {
            let identifier = CheckIdentifier::new("prod", tenant, "api", format!("check-{i}"));
            pending.push(handle.queue_health_check(tenant, identifier, check.clone(), evaluator.clone()));
        }
    }

    let cancel = CancellationToken::new();
    let runner = {
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    tokio::time::timeout(Duration::from_secs(10), join_all(pending))
        .await
        .unwrap();

    assert_eq!(*tracker.order.lock(), vec!["a", "b", "a", "b", "a", "a"]);

    cancel.cancel();
    runner.await.unwrap().unwrap_err();
}
