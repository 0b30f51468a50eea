//! Hub-side services
//!
//! The hub receives reports from agents, writes them to the time-series
//! backend and answers hierarchical health reads.

pub mod error_reports;
pub mod health;
pub mod hierarchy;

use std::fmt;

use crate::model::ConfigurationError;
use crate::storage::StorageError;
use crate::timeseries::TimeSeriesError;

pub use error_reports::{ErrorReportLog, StoredErrorReport};
pub use health::{EnvironmentHealth, HealthDataService, StatusSource, TenantHealth};
pub use hierarchy::{ServiceHierarchySource, StaticHierarchy};

/// Errors raised by hub services
#[derive(Debug)]
pub enum HubError {
    /// The environment or tenant is not configured
    NotFound(String),

    /// The tenant configuration does not form a valid tree
    Configuration(ConfigurationError),

    /// Writing to the time-series backend failed
    TimeSeries(TimeSeriesError),

    /// The status cache failed
    Storage(StorageError),
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubError::NotFound(what) => write!(f, "{} not found", what),
            HubError::Configuration(err) => write!(f, "invalid tenant configuration: {}", err),
            HubError::TimeSeries(err) => write!(f, "{}", err),
            HubError::Storage(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for HubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HubError::NotFound(_) => None,
            HubError::Configuration(err) => Some(err),
            HubError::TimeSeries(err) => Some(err),
            HubError::Storage(err) => Some(err),
        }
    }
}

impl From<ConfigurationError> for HubError {
    fn from(err: ConfigurationError) -> Self {
        HubError::Configuration(err)
    }
}

impl From<TimeSeriesError> for HubError {
    fn from(err: TimeSeriesError) -> Self {
        HubError::TimeSeries(err)
    }
}

impl From<StorageError> for HubError {
    fn from(err: StorageError) -> Self {
        HubError::Storage(err)
    }
}
