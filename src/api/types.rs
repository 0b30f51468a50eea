//! API response types

use serde::{Deserialize, Serialize};

use crate::hub::StoredErrorReport;
use crate::maintenance::MaintenanceRecord;

/// Response of `GET /api/v1/health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: String,
    pub timestamp: String,
    pub storage: StorageStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStatus {
    pub healthy: bool,
    pub message: String,
}

/// Response of a sample upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplesResponse {
    pub accepted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReportsResponse {
    pub environment: String,
    pub reports: Vec<StoredErrorReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceResponse {
    pub maintenance: Vec<MaintenanceRecord>,
}
