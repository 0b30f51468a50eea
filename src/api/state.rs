//! API shared state containing the hub services

use std::sync::Arc;

use crate::hub::{ErrorReportLog, HealthDataService, ServiceHierarchySource};
use crate::maintenance::MaintenanceStore;
use crate::storage::StatusCache;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Status recording and aggregated health reads
    pub health: Arc<HealthDataService>,

    /// Recent error reports filed by agents
    pub error_reports: Arc<ErrorReportLog>,

    /// Maintenance windows
    pub maintenance: Arc<dyn MaintenanceStore>,

    /// Last-known-status cache, probed by the health endpoint
    pub cache: Arc<dyn StatusCache>,
}

impl ApiState {
    pub fn new(
        health: Arc<HealthDataService>,
        error_reports: Arc<ErrorReportLog>,
        maintenance: Arc<dyn MaintenanceStore>,
        cache: Arc<dyn StatusCache>,
    ) -> Self {
        Self {
            health,
            error_reports,
            maintenance,
            cache,
        }
    }

    pub fn hierarchy(&self) -> &Arc<dyn ServiceHierarchySource> {
        self.health.hierarchy()
    }
}
