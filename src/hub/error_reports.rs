//! Recent error reports filed by agents

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, warn};

use crate::agent::api::{ErrorLevel, ErrorReportDetails};
use crate::model::same_name;

/// An error report together with the environment it was filed for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredErrorReport {
    pub environment: String,
    #[serde(flatten)]
    pub details: ErrorReportDetails,
}

/// Keeps the most recent reports, evicting the oldest when full.
#[derive(Debug)]
pub struct ErrorReportLog {
    reports: Mutex<VecDeque<StoredErrorReport>>,
    capacity: usize,
}

impl ErrorReportLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            reports: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, environment: &str, details: ErrorReportDetails) {
        match details.level {
            ErrorLevel::Warning => warn!(
                environment,
                tenant = details.tenant.as_deref(),
                service = details.service.as_deref(),
                "agent reported: {}",
                details.message
            ),
            ErrorLevel::Error => error!(
                environment,
                tenant = details.tenant.as_deref(),
                service = details.service.as_deref(),
                "agent reported: {}",
                details.message
            ),
        }

        let mut reports = self.reports.lock();
        if reports.len() == self.capacity {
            reports.pop_front();
        }
        reports.push_back(StoredErrorReport {
            environment: environment.to_string(),
            details,
        });
    }

    /// Reports for one environment, newest first.
    pub fn recent(&self, environment: &str) -> Vec<StoredErrorReport> {
        self.reports
            .lock()
            .iter()
            .rev()
            .filter(|report| same_name(&report.environment, environment))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}
