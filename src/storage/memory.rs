//! In-memory stores (no persistence)
//!
//! Used when no database is configured and in tests. The maintenance store
//! applies the same claim condition as the SQL statement under one lock, so it
//! is exclusive within a single process only.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::backend::{BackendHealth, StatusCache};
use super::error::{StorageError, StorageResult};
use crate::maintenance::{MaintenanceRecord, MaintenanceStore, NewMaintenance};
use crate::model::{ServiceHealthReport, fold_name};

#[derive(Debug, Default)]
struct MaintenanceTable {
    records: BTreeMap<i64, MaintenanceRecord>,
    next_id: i64,
}

/// Maintenance records kept in a map.
#[derive(Debug, Default)]
pub struct MemoryMaintenanceStore {
    table: Mutex<MaintenanceTable>,
}

impl MemoryMaintenanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MaintenanceStore for MemoryMaintenanceStore {
    async fn insert(&self, maintenance: NewMaintenance) -> StorageResult<MaintenanceRecord> {
        let mut table = self.table.lock();
        table.next_id += 1;

        let record = MaintenanceRecord {
            id: table.next_id,
            scope: maintenance.scope,
            start_time: maintenance.start_time,
            end_time: maintenance.end_time,
            is_recording: false,
            last_recorded: None,
        };
        table.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn list(&self) -> StorageResult<Vec<MaintenanceRecord>> {
        let mut records: Vec<_> = self.table.lock().records.values().cloned().collect();
        records.sort_by_key(|record| (record.start_time, record.id));
        Ok(records)
    }

    async fn claim(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> StorageResult<Vec<MaintenanceRecord>> {
        let mut table = self.table.lock();
        let claimed: Vec<_> = table
            .records
            .values_mut()
            .filter(|record| {
                record.start_time <= now
                    && (!record.is_recording || record.last_recorded.is_none_or(|last| last < stale_before))
            })
            .map(|record| {
                record.is_recording = true;
                record.last_recorded = Some(now);
                record.clone()
            })
            .collect();

        debug!("claimed {} maintenance records", claimed.len());
        Ok(claimed)
    }

    async fn release(&self, id: i64) -> StorageResult<()> {
        if let Some(record) = self.table.lock().records.get_mut(&id) {
            record.is_recording = false;
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> StorageResult<()> {
        self.table
            .lock()
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound(id))
    }
}

type StatusKey = (String, String, String);

/// Latest report per service kept in a map.
#[derive(Debug, Default)]
pub struct MemoryStatusCache {
    reports: Mutex<HashMap<StatusKey, ServiceHealthReport>>,
}

impl MemoryStatusCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusCache for MemoryStatusCache {
    async fn upsert_status(
        &self,
        environment: &str,
        tenant: &str,
        service: &str,
        report: &ServiceHealthReport,
    ) -> StorageResult<()> {
        let key = (fold_name(environment), fold_name(tenant), fold_name(service));
        let mut reports = self.reports.lock();

        let newer = reports
            .get(&key)
            .is_none_or(|stored| report.timestamp >= stored.timestamp);
        if newer {
            reports.insert(key, report.clone());
        }
        Ok(())
    }

    async fn latest_statuses(
        &self,
        environment: &str,
        tenant: &str,
    ) -> StorageResult<HashMap<String, ServiceHealthReport>> {
        let environment = fold_name(environment);
        let tenant = fold_name(tenant);

        Ok(self
            .reports
            .lock()
            .iter()
            .filter(|((env, ten, _), _)| *env == environment && *ten == tenant)
            .map(|((_, _, service), report)| (service.clone(), report.clone()))
            .collect())
    }

    async fn health_check(&self) -> StorageResult<BackendHealth> {
        Ok(BackendHealth {
            healthy: true,
            message: format!("in-memory cache holding {} reports", self.reports.lock().len()),
        })
    }
}
