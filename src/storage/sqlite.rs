//! SQLite storage
//!
//! Holds the maintenance records with their recording lock and the
//! last-known-status cache. Several hub replicas may share one database file;
//! the only coordination between them is the conditional update in
//! [`MaintenanceStore::claim`].

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{BackendHealth, StatusCache};
use super::error::{StorageError, StorageResult};
use super::schema::{MaintenanceRow, ScopeColumns};
use crate::maintenance::{MaintenanceRecord, MaintenanceStore, NewMaintenance};
use crate::model::{ServiceHealthReport, fold_name};

const MAINTENANCE_COLUMNS: &str = "id, scope_kind, environment, tenant, service, start_time, end_time, is_recording, last_recorded";

/// SQLite-backed maintenance store and status cache
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("opening SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }
}

fn maintenance_row(row: &SqliteRow) -> StorageResult<MaintenanceRow> {
    Ok(MaintenanceRow {
        id: row.try_get("id")?,
        scope_kind: row.try_get("scope_kind")?,
        environment: row.try_get("environment")?,
        tenant: row.try_get("tenant")?,
        service: row.try_get("service")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        is_recording: row.try_get("is_recording")?,
        last_recorded: row.try_get("last_recorded")?,
    })
}

fn maintenance_records(rows: Vec<SqliteRow>) -> StorageResult<Vec<MaintenanceRecord>> {
    rows.iter()
        .map(|row| maintenance_row(row).and_then(MaintenanceRecord::try_from))
        .collect()
}

#[async_trait]
impl MaintenanceStore for SqliteStore {
    #[instrument(skip(self), fields(scope = %maintenance.scope))]
    async fn insert(&self, maintenance: NewMaintenance) -> StorageResult<MaintenanceRecord> {
        let columns = ScopeColumns::from(&maintenance.scope);

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO maintenance (scope_kind, environment, tenant, service, start_time, end_time)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {MAINTENANCE_COLUMNS}
            "#
        ))
        .bind(columns.kind)
        .bind(&columns.environment)
        .bind(&columns.tenant)
        .bind(&columns.service)
        .bind(Self::timestamp_to_millis(&maintenance.start_time))
        .bind(Self::timestamp_to_millis(&maintenance.end_time))
        .fetch_one(&self.pool)
        .await?;

        MaintenanceRecord::try_from(maintenance_row(&row)?)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> StorageResult<Vec<MaintenanceRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {MAINTENANCE_COLUMNS} FROM maintenance ORDER BY start_time ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        maintenance_records(rows)
    }

    #[instrument(skip(self))]
    async fn claim(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> StorageResult<Vec<MaintenanceRecord>> {
        let now_millis = Self::timestamp_to_millis(&now);

        let rows = sqlx::query(&format!(
            r#"
            UPDATE maintenance
            SET is_recording = 1, last_recorded = ?
            WHERE start_time <= ?
              AND (is_recording = 0 OR last_recorded IS NULL OR last_recorded < ?)
            RETURNING {MAINTENANCE_COLUMNS}
            "#
        ))
        .bind(now_millis)
        .bind(now_millis)
        .bind(Self::timestamp_to_millis(&stale_before))
        .fetch_all(&self.pool)
        .await?;

        let mut records = maintenance_records(rows)?;
        records.sort_by_key(|record| record.id);
        debug!("claimed {} maintenance records", records.len());
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn release(&self, id: i64) -> StorageResult<()> {
        sqlx::query("UPDATE maintenance SET is_recording = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM maintenance WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl StatusCache for SqliteStore {
    #[instrument(skip(self, report))]
    async fn upsert_status(
        &self,
        environment: &str,
        tenant: &str,
        service: &str,
        report: &ServiceHealthReport,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(report)
            .map_err(|e| StorageError::InvalidData(format!("failed to serialize report: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO service_status (environment, tenant, service, timestamp, report)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (environment, tenant, service) DO UPDATE SET
                timestamp = excluded.timestamp,
                report = excluded.report
            WHERE excluded.timestamp >= service_status.timestamp
            "#,
        )
        .bind(fold_name(environment))
        .bind(fold_name(tenant))
        .bind(fold_name(service))
        .bind(Self::timestamp_to_millis(&report.timestamp))
        .bind(json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn latest_statuses(
        &self,
        environment: &str,
        tenant: &str,
    ) -> StorageResult<HashMap<String, ServiceHealthReport>> {
        let rows = sqlx::query("SELECT service, report FROM service_status WHERE environment = ? AND tenant = ?")
            .bind(fold_name(environment))
            .bind(fold_name(tenant))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let service: String = row.try_get("service")?;
                let report: String = row.try_get("report")?;
                let report = serde_json::from_str(&report).map_err(|e| {
                    StorageError::InvalidData(format!("failed to deserialize report: {}", e))
                })?;
                Ok((service, report))
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<BackendHealth> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(BackendHealth {
                healthy: true,
                message: format!("SQLite store at {} operational", self.db_path),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(BackendHealth {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                })
            }
        }
    }
}
