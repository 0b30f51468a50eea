//! Last-known-status cache
//!
//! The time-series backend is the source of truth for reported status. The
//! hub also keeps the latest report per service in SQL so it can still answer
//! health reads while that backend is unavailable.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use crate::model::ServiceHealthReport;

/// Health of the storage backend itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendHealth {
    pub healthy: bool,
    pub message: String,
}

/// Fallback store for the latest report of each service.
#[async_trait]
pub trait StatusCache: Send + Sync {
    /// Replace the stored report for a service unless the stored one is newer.
    async fn upsert_status(
        &self,
        environment: &str,
        tenant: &str,
        service: &str,
        report: &ServiceHealthReport,
    ) -> StorageResult<()>;

    /// Latest report per service of a tenant, keyed by lowercased service name.
    async fn latest_statuses(
        &self,
        environment: &str,
        tenant: &str,
    ) -> StorageResult<HashMap<String, ServiceHealthReport>>;

    async fn health_check(&self) -> StorageResult<BackendHealth>;
}
