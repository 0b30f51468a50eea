//! Integration tests for maintenance recording
//!
//! These tests verify that:
//! - Scopes expand to every affected service of the hierarchy
//! - An ended window writes a final 0 and disappears without being released first
//! - Failed writes release the record so the next tick retries it
//! - Concurrent recorders never record the same window twice

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use canopy::hub::{ServiceHierarchySource, StaticHierarchy};
use canopy::maintenance::recorder::MAINTENANCE_STATUS_METRIC;
use canopy::maintenance::{MaintenanceRecord, MaintenanceRecorder, MaintenanceScope, MaintenanceStore, NewMaintenance};
use canopy::storage::{MemoryMaintenanceStore, StorageResult};
use canopy::timeseries::{MemoryMetricWriter, MetricLine, MetricWriter, TimeSeriesError, TimeSeriesResult};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use pretty_assertions::assert_eq;

use crate::helpers::{at, service, tenant};

fn hierarchy() -> Arc<dyn ServiceHierarchySource> {
    let acme = tenant(
        vec![
            service("api", vec![], &["db"]),
            service("db", vec![], &[]),
            service("web", vec![], &[]),
        ],
        &["api", "web"],
    );
    let globex = tenant(vec![service("shop", vec![], &[])], &["shop"]);

    let mut tenants = BTreeMap::new();
    tenants.insert("acme".to_string(), acme);
    tenants.insert("globex".to_string(), globex);

    let mut environments = BTreeMap::new();
    environments.insert("prod".to_string(), tenants);
    Arc::new(StaticHierarchy::new(environments))
}

fn recorder(store: Arc<dyn MaintenanceStore>, writer: Arc<dyn MetricWriter>) -> MaintenanceRecorder {
    MaintenanceRecorder::new(store, hierarchy(), writer, Duration::from_secs(60))
}

fn window(scope: MaintenanceScope, start: i64, end: i64) -> NewMaintenance {
    NewMaintenance {
        scope,
        start_time: at(start),
        end_time: at(end),
    }
}

fn services(lines: &[MetricLine]) -> Vec<String> {
    lines
        .iter()
        .map(|line| format!("{}/{}", line.labels["tenant"], line.labels["service"]))
        .collect()
}

/// Fails every write until switched off.
#[derive(Default)]
struct FlakyWriter {
    failing: AtomicBool,
    inner: MemoryMetricWriter,
}

#[async_trait]
impl MetricWriter for FlakyWriter {
    async fn write(&self, lines: Vec<MetricLine>) -> TimeSeriesResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TimeSeriesError::Http(503));
        }
        self.inner.write(lines).await
    }
}

/// Holds every write long enough for competing recorders to try their claim.
#[derive(Default)]
struct SlowWriter {
    inner: MemoryMetricWriter,
}

#[async_trait]
impl MetricWriter for SlowWriter {
    async fn write(&self, lines: Vec<MetricLine>) -> TimeSeriesResult<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.write(lines).await
    }
}

/// Logs which store calls the recorder makes.
#[derive(Default)]
struct CallLog {
    inner: MemoryMaintenanceStore,
    calls: Mutex<Vec<&'static str>>,
}

impl CallLog {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MaintenanceStore for CallLog {
    async fn insert(&self, maintenance: NewMaintenance) -> StorageResult<MaintenanceRecord> {
        self.inner.insert(maintenance).await
    }

    async fn list(&self) -> StorageResult<Vec<MaintenanceRecord>> {
        self.inner.list().await
    }

    async fn claim(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> StorageResult<Vec<MaintenanceRecord>> {
        self.calls.lock().unwrap().push("claim");
        self.inner.claim(now, stale_before).await
    }

    async fn release(&self, id: i64) -> StorageResult<()> {
        self.calls.lock().unwrap().push("release");
        self.inner.release(id).await
    }

    async fn delete(&self, id: i64) -> StorageResult<()> {
        self.calls.lock().unwrap().push("delete");
        self.inner.delete(id).await
    }
}

/// Deletes every maintenance record while the final value is written, like an
/// operator cancelling the window at that moment.
struct CancellingWriter {
    store: Arc<dyn MaintenanceStore>,
    inner: MemoryMetricWriter,
}

#[async_trait]
impl MetricWriter for CancellingWriter {
    async fn write(&self, lines: Vec<MetricLine>) -> TimeSeriesResult<()> {
        for record in self.store.list().await.unwrap_or_default() {
            let _ = self.store.delete(record.id).await;
        }
        self.inner.write(lines).await
    }
}

#[tokio::test]
async fn test_tenant_scope_covers_every_service() {
    let store = Arc::new(MemoryMaintenanceStore::new());
    let writer = Arc::new(MemoryMetricWriter::new());
    store
        .insert(window(
            MaintenanceScope::Tenant {
                environment: "prod".to_string(),
                tenant: "acme".to_string(),
            },
            0,
            3600,
        ))
        .await
        .unwrap();

    let recorded = recorder(store.clone(), writer.clone()).record_once(at(60)).await.unwrap();

    assert_eq!(recorded, 1);
    let lines = writer.lines_named(MAINTENANCE_STATUS_METRIC);
    assert_eq!(services(&lines), vec!["acme/api", "acme/db", "acme/web"]);
    assert!(lines.iter().all(|line| line.value == 1.0 && line.timestamp == at(60)));

    let records = store.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_recording);
    assert_eq!(records[0].last_recorded, Some(at(60)));
}

#[tokio::test]
async fn test_service_scope_covers_subtree() {
    let store = Arc::new(MemoryMaintenanceStore::new());
    let writer = Arc::new(MemoryMetricWriter::new());
    store
        .insert(window(
            MaintenanceScope::Service {
                environment: "prod".to_string(),
                tenant: "acme".to_string(),
                service: "api".to_string(),
            },
            0,
            3600,
        ))
        .await
        .unwrap();

    recorder(store, writer.clone()).record_once(at(60)).await.unwrap();

    assert_eq!(services(&writer.lines()), vec!["acme/api", "acme/db"]);
}

#[tokio::test]
async fn test_environment_scope_covers_every_tenant() {
    let store = Arc::new(MemoryMaintenanceStore::new());
    let writer = Arc::new(MemoryMetricWriter::new());
    store
        .insert(window(
            MaintenanceScope::Environment {
                environment: "prod".to_string(),
            },
            0,
            3600,
        ))
        .await
        .unwrap();

    recorder(store, writer.clone()).record_once(at(60)).await.unwrap();

    assert_eq!(
        services(&writer.lines()),
        vec!["acme/api", "acme/db", "acme/web", "globex/shop"]
    );
}

#[tokio::test]
async fn test_window_not_started_is_ignored() {
    let store = Arc::new(MemoryMaintenanceStore::new());
    let writer = Arc::new(MemoryMetricWriter::new());
    store
        .insert(window(
            MaintenanceScope::Environment {
                environment: "prod".to_string(),
            },
            600,
            3600,
        ))
        .await
        .unwrap();

    let recorded = recorder(store, writer.clone()).record_once(at(60)).await.unwrap();

    assert_eq!(recorded, 0);
    assert!(writer.lines().is_empty());
}

#[tokio::test]
async fn test_ended_window_writes_zero_and_is_deleted() {
    let store = Arc::new(MemoryMaintenanceStore::new());
    let writer = Arc::new(MemoryMetricWriter::new());
    store
        .insert(window(
            MaintenanceScope::Tenant {
                environment: "prod".to_string(),
                tenant: "globex".to_string(),
            },
            0,
            300,
        ))
        .await
        .unwrap();

    let recorded = recorder(store.clone(), writer.clone()).record_once(at(300)).await.unwrap();

    assert_eq!(recorded, 1);
    let lines = writer.lines();
    assert_eq!(services(&lines), vec!["globex/shop"]);
    assert_eq!(lines[0].value, 0.0);
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ended_window_is_deleted_while_still_claimed() {
    let store = Arc::new(CallLog::default());
    let writer = Arc::new(MemoryMetricWriter::new());
    store
        .insert(window(
            MaintenanceScope::Tenant {
                environment: "prod".to_string(),
                tenant: "globex".to_string(),
            },
            0,
            300,
        ))
        .await
        .unwrap();
    store
        .insert(window(
            MaintenanceScope::Tenant {
                environment: "prod".to_string(),
                tenant: "acme".to_string(),
            },
            0,
            3600,
        ))
        .await
        .unwrap();

    let recorded = recorder(store.clone(), writer.clone()).record_once(at(300)).await.unwrap();

    assert_eq!(recorded, 2);
    // the ended window is never handed back for another replica to claim
    let mut calls = store.calls();
    calls.sort();
    assert_eq!(calls, vec!["claim", "delete", "release"]);
    let remaining = store.list().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(!remaining[0].is_recording);
}

#[tokio::test]
async fn test_window_deleted_during_final_write_is_not_a_failure() {
    let store: Arc<dyn MaintenanceStore> = Arc::new(MemoryMaintenanceStore::new());
    let writer = Arc::new(CancellingWriter {
        store: store.clone(),
        inner: MemoryMetricWriter::new(),
    });
    store
        .insert(window(
            MaintenanceScope::Tenant {
                environment: "prod".to_string(),
                tenant: "globex".to_string(),
            },
            0,
            300,
        ))
        .await
        .unwrap();

    let recorded = recorder(store.clone(), writer.clone()).record_once(at(300)).await.unwrap();

    assert_eq!(recorded, 1);
    assert_eq!(writer.inner.lines()[0].value, 0.0);
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_write_releases_record_for_retry() {
    let store = Arc::new(MemoryMaintenanceStore::new());
    let writer = Arc::new(FlakyWriter::default());
    writer.failing.store(true, Ordering::SeqCst);
    store
        .insert(window(
            MaintenanceScope::Tenant {
                environment: "prod".to_string(),
                tenant: "acme".to_string(),
            },
            0,
            3600,
        ))
        .await
        .unwrap();

    let recorder = recorder(store.clone(), writer.clone());
    assert!(recorder.record_once(at(60)).await.is_err());
    assert!(!store.list().await.unwrap()[0].is_recording);

    writer.failing.store(false, Ordering::SeqCst);
    assert_eq!(recorder.record_once(at(120)).await.unwrap(), 1);
    assert_eq!(writer.inner.lines().len(), 3);
}

#[tokio::test]
async fn test_concurrent_recorders_record_once() {
    let store: Arc<dyn MaintenanceStore> = Arc::new(MemoryMaintenanceStore::new());
    let writer = Arc::new(SlowWriter::default());
    store
        .insert(window(
            MaintenanceScope::Tenant {
                environment: "prod".to_string(),
                tenant: "globex".to_string(),
            },
            0,
            3600,
        ))
        .await
        .unwrap();

    let recorders: Vec<_> = (0..5).map(|_| recorder(store.clone(), writer.clone())).collect();
    let results = join_all(recorders.iter().map(|recorder| recorder.record_once(at(60)))).await;

    let recorded: usize = results.into_iter().map(|result| result.unwrap()).sum();
    assert_eq!(recorded, 1);
    assert_eq!(writer.inner.lines().len(), 1);
}

#[tokio::test]
async fn test_abandoned_lock_is_reclaimed_once_stale() {
    let store = Arc::new(MemoryMaintenanceStore::new());
    let writer = Arc::new(MemoryMetricWriter::new());
    store
        .insert(window(
            MaintenanceScope::Tenant {
                environment: "prod".to_string(),
                tenant: "globex".to_string(),
            },
            0,
            3600,
        ))
        .await
        .unwrap();

    // a replica that claimed the record at t=60 and never released it
    let abandoned = store.claim(at(60), at(-120)).await.unwrap();
    assert_eq!(abandoned.len(), 1);

    let recorder = recorder(store.clone(), writer.clone());
    assert_eq!(recorder.record_once(at(120)).await.unwrap(), 0);
    assert!(writer.lines().is_empty());

    // default staleness is three 60s intervals
    assert_eq!(recorder.record_once(at(300)).await.unwrap(), 1);
    assert_eq!(services(&writer.lines()), vec!["globex/shop"]);
    assert!(!store.list().await.unwrap()[0].is_recording);
}
