//! Column mapping for maintenance records
//!
//! A [`MaintenanceScope`] is stored as a kind column plus nullable
//! `tenant` / `service` columns so the claim statement stays a plain update.

use chrono::{DateTime, Utc};

use super::error::{StorageError, StorageResult};
use crate::maintenance::{MaintenanceRecord, MaintenanceScope};

pub(crate) const SCOPE_ENVIRONMENT: &str = "environment";
pub(crate) const SCOPE_TENANT: &str = "tenant";
pub(crate) const SCOPE_SERVICE: &str = "service";

/// Scope split into its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScopeColumns {
    pub kind: &'static str,
    pub environment: String,
    pub tenant: Option<String>,
    pub service: Option<String>,
}

impl From<&MaintenanceScope> for ScopeColumns {
    fn from(scope: &MaintenanceScope) -> Self {
        match scope {
            MaintenanceScope::Environment { environment } => ScopeColumns {
                kind: SCOPE_ENVIRONMENT,
                environment: environment.clone(),
                tenant: None,
                service: None,
            },
            MaintenanceScope::Tenant { environment, tenant } => ScopeColumns {
                kind: SCOPE_TENANT,
                environment: environment.clone(),
                tenant: Some(tenant.clone()),
                service: None,
            },
            MaintenanceScope::Service {
                environment,
                tenant,
                service,
            } => ScopeColumns {
                kind: SCOPE_SERVICE,
                environment: environment.clone(),
                tenant: Some(tenant.clone()),
                service: Some(service.clone()),
            },
        }
    }
}

/// One row of the `maintenance` table.
#[derive(Debug, Clone)]
pub(crate) struct MaintenanceRow {
    pub id: i64,
    pub scope_kind: String,
    pub environment: String,
    pub tenant: Option<String>,
    pub service: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub is_recording: bool,
    pub last_recorded: Option<i64>,
}

pub(crate) fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp {millis} out of range")))
}

impl TryFrom<MaintenanceRow> for MaintenanceRecord {
    type Error = StorageError;

    fn try_from(row: MaintenanceRow) -> StorageResult<Self> {
        let missing = |column: &str| {
            StorageError::InvalidData(format!(
                "maintenance record {} of kind '{}' has no {}",
                row.id, row.scope_kind, column
            ))
        };

        let scope = match row.scope_kind.as_str() {
            SCOPE_ENVIRONMENT => MaintenanceScope::Environment {
                environment: row.environment.clone(),
            },
            SCOPE_TENANT => MaintenanceScope::Tenant {
                environment: row.environment.clone(),
                tenant: row.tenant.clone().ok_or_else(|| missing("tenant"))?,
            },
            SCOPE_SERVICE => MaintenanceScope::Service {
                environment: row.environment.clone(),
                tenant: row.tenant.clone().ok_or_else(|| missing("tenant"))?,
                service: row.service.clone().ok_or_else(|| missing("service"))?,
            },
            other => {
                return Err(StorageError::InvalidData(format!(
                    "unknown maintenance scope '{other}'"
                )));
            }
        };

        Ok(MaintenanceRecord {
            id: row.id,
            scope,
            start_time: millis_to_timestamp(row.start_time)?,
            end_time: millis_to_timestamp(row.end_time)?,
            is_recording: row.is_recording,
            last_recorded: row.last_recorded.map(millis_to_timestamp).transpose()?,
        })
    }
}
