//! Maintenance windows
//!
//! A maintenance window marks an environment, a tenant or a single service
//! subtree as under maintenance between two instants. The hub periodically
//! writes `canopy_service_maintenance_status` for every affected service
//! through the [`MaintenanceRecorder`].
//!
//! Several hub replicas may run the recorder against one database. Each pass
//! claims records with a single conditional update, so a record is only ever
//! processed by one replica at a time.

pub mod recorder;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ConfigurationError;
use crate::storage::{StorageError, StorageResult};
use crate::timeseries::TimeSeriesError;

pub use recorder::MaintenanceRecorder;

/// What a maintenance window covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum MaintenanceScope {
    Environment {
        environment: String,
    },
    Tenant {
        environment: String,
        tenant: String,
    },
    Service {
        environment: String,
        tenant: String,
        service: String,
    },
}

impl MaintenanceScope {
    pub fn environment(&self) -> &str {
        match self {
            MaintenanceScope::Environment { environment }
            | MaintenanceScope::Tenant { environment, .. }
            | MaintenanceScope::Service { environment, .. } => environment,
        }
    }
}

impl fmt::Display for MaintenanceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceScope::Environment { environment } => write!(f, "{}", environment),
            MaintenanceScope::Tenant { environment, tenant } => write!(f, "{}/{}", environment, tenant),
            MaintenanceScope::Service {
                environment,
                tenant,
                service,
            } => write!(f, "{}/{}/{}", environment, tenant, service),
        }
    }
}

/// A stored maintenance window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRecord {
    pub id: i64,
    pub scope: MaintenanceScope,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_recording: bool,
    pub last_recorded: Option<DateTime<Utc>>,
}

/// A maintenance window to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMaintenance {
    pub scope: MaintenanceScope,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Persistence for maintenance records.
#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    async fn insert(&self, maintenance: NewMaintenance) -> StorageResult<MaintenanceRecord>;

    async fn list(&self) -> StorageResult<Vec<MaintenanceRecord>>;

    /// Atomically mark every claimable record as recording and return them.
    ///
    /// A record is claimable once `start_time <= now`, when nobody is recording
    /// it or its lock was last refreshed before `stale_before`. Claiming sets
    /// `is_recording` and `last_recorded = now`.
    async fn claim(&self, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> StorageResult<Vec<MaintenanceRecord>>;

    async fn release(&self, id: i64) -> StorageResult<()>;

    async fn delete(&self, id: i64) -> StorageResult<()>;
}

/// Errors raised while recording maintenance status
#[derive(Debug)]
pub enum MaintenanceError {
    /// Reading or updating maintenance records failed
    Storage(StorageError),

    /// A tenant configuration could not be materialized
    Configuration(ConfigurationError),

    /// Writing the status metric failed
    Write(TimeSeriesError),
}

impl fmt::Display for MaintenanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceError::Storage(err) => write!(f, "maintenance storage error: {}", err),
            MaintenanceError::Configuration(err) => write!(f, "invalid tenant configuration: {}", err),
            MaintenanceError::Write(err) => write!(f, "failed to write maintenance status: {}", err),
        }
    }
}

impl std::error::Error for MaintenanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MaintenanceError::Storage(err) => Some(err),
            MaintenanceError::Configuration(err) => Some(err),
            MaintenanceError::Write(err) => Some(err),
        }
    }
}

impl From<StorageError> for MaintenanceError {
    fn from(err: StorageError) -> Self {
        MaintenanceError::Storage(err)
    }
}

impl From<ConfigurationError> for MaintenanceError {
    fn from(err: ConfigurationError) -> Self {
        MaintenanceError::Configuration(err)
    }
}

impl From<TimeSeriesError> for MaintenanceError {
    fn from(err: TimeSeriesError) -> Self {
        MaintenanceError::Write(err)
    }
}
