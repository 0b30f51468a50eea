//! Integration tests for the SQLite store
//!
//! These tests verify that:
//! - Maintenance records and cached statuses survive reopening the database
//! - Concurrent claims never hand the same record to two recorders
//! - A full recording cycle works against SQL storage

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use canopy::hub::StaticHierarchy;
use canopy::maintenance::{MaintenanceRecorder, MaintenanceScope, MaintenanceStore, NewMaintenance};
use canopy::model::{HealthStatus, ServiceHealthReport};
use canopy::storage::{SqliteStore, StatusCache};
use canopy::timeseries::MemoryMetricWriter;
use futures::future::join_all;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::helpers::{at, service, tenant};

fn tenant_window(start: i64, end: i64) -> NewMaintenance {
    NewMaintenance {
        scope: MaintenanceScope::Tenant {
            environment: "prod".to_string(),
            tenant: "acme".to_string(),
        },
        start_time: at(start),
        end_time: at(end),
    }
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("canopy.db");

    {
        let store = SqliteStore::new(&db_path).await.unwrap();
        store.insert(tenant_window(0, 3600)).await.unwrap();

        let mut checks = BTreeMap::new();
        checks.insert("live".to_string(), HealthStatus::Degraded);
        store
            .upsert_status("prod", "acme", "API", &ServiceHealthReport::from_checks(at(10), checks))
            .await
            .unwrap();
        store.close().await;
    }

    let store = SqliteStore::new(&db_path).await.unwrap();

    let records = store.list().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].end_time, at(3600));

    let statuses = store.latest_statuses("PROD", "Acme").await.unwrap();
    assert_eq!(statuses["api"].aggregate_status, HealthStatus::Degraded);
    assert_eq!(statuses["api"].timestamp, at(10));

    assert!(store.health_check().await.unwrap().healthy);
}

#[tokio::test]
async fn test_concurrent_claims_are_exclusive() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("canopy.db")).await.unwrap());
    for _ in 0..3 {
        store.insert(tenant_window(0, 3600)).await.unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.claim(at(60), at(-120)).await.unwrap() })
        })
        .collect();

    let mut claimed: Vec<i64> = join_all(handles)
        .await
        .into_iter()
        .flat_map(|result| result.unwrap())
        .map(|record| record.id)
        .collect();
    claimed.sort();

    // every record handed out exactly once
    let mut ids: Vec<i64> = store.list().await.unwrap().iter().map(|record| record.id).collect();
    ids.sort();
    assert_eq!(claimed, ids);
}

#[tokio::test]
async fn test_recording_cycle_against_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::new(temp_dir.path().join("canopy.db")).await.unwrap());
    store.insert(tenant_window(0, 120)).await.unwrap();

    let mut tenants = BTreeMap::new();
    tenants.insert(
        "acme".to_string(),
        tenant(vec![service("api", vec![], &[]), service("web", vec![], &[])], &["api", "web"]),
    );
    let mut environments = BTreeMap::new();
    environments.insert("prod".to_string(), tenants);

    let writer = Arc::new(MemoryMetricWriter::new());
    let recorder = MaintenanceRecorder::new(
        store.clone(),
        Arc::new(StaticHierarchy::new(environments)),
        writer.clone(),
        Duration::from_secs(60),
    );

    assert_eq!(recorder.record_once(at(60)).await.unwrap(), 1);
    assert!(!store.list().await.unwrap()[0].is_recording);

    assert_eq!(recorder.record_once(at(120)).await.unwrap(), 1);
    assert!(store.list().await.unwrap().is_empty());

    let values: Vec<f64> = writer.lines().iter().map(|line| line.value).collect();
    assert_eq!(values, vec![1.0, 1.0, 0.0, 0.0]);
}
