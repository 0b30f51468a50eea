//! Flap damping for check results
//!
//! A check that reports a different status than last time keeps its previous
//! status until the new one has been seen more than `tolerance` times in a
//! row. With a tolerance of zero every observation passes through unchanged.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::model::{HealthStatus, fold_name};

type SmoothingKey = (String, String);

fn key(service: &str, check: &str) -> SmoothingKey {
    (fold_name(service), fold_name(check))
}

/// State kept for one (service, check) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingEntry {
    pub cached_status: HealthStatus,
    pub outlier_status: Option<HealthStatus>,
    pub consecutive_outliers: u32,
}

/// Per-tenant smoothing state.
///
/// Owned by a single tenant loop, so it takes `&mut self` and needs no lock.
#[derive(Debug, Default)]
pub struct StatusSmoother {
    entries: HashMap<SmoothingKey, SmoothingEntry>,
    tolerance: u32,
}

impl StatusSmoother {
    pub fn new(tolerance: u32) -> Self {
        Self {
            entries: HashMap::new(),
            tolerance,
        }
    }

    pub fn tolerance(&self) -> u32 {
        self.tolerance
    }

    pub fn set_tolerance(&mut self, tolerance: u32) {
        self.tolerance = tolerance;
    }

    /// Feed one observation and get the status to report.
    pub fn smooth(&mut self, service: &str, check: &str, observed: HealthStatus) -> HealthStatus {
        let key = key(service, check);

        let Some(entry) = self.entries.get_mut(&key) else {
            self.entries.insert(
                key,
                SmoothingEntry {
                    cached_status: observed,
                    outlier_status: Some(observed),
                    consecutive_outliers: 0,
                },
            );
            return observed;
        };

        if entry.cached_status == observed {
            entry.consecutive_outliers = 0;
            entry.outlier_status = None;
            return observed;
        }

        if entry.consecutive_outliers + 1 > self.tolerance {
            trace!(service, check, from = %entry.cached_status, to = %observed, "status change accepted");
            self.entries.remove(&key);
            return observed;
        }

        entry.consecutive_outliers += 1;
        entry.outlier_status = Some(observed);
        trace!(
            service,
            check,
            outliers = entry.consecutive_outliers,
            "holding {} over {}",
            entry.cached_status,
            observed
        );
        entry.cached_status
    }

    /// Drop entries for (service, check) pairs not observed this cycle.
    pub fn retain_observed<'a>(&mut self, observed: impl IntoIterator<Item = (&'a str, &'a str)>) {
        let seen: HashSet<SmoothingKey> = observed
            .into_iter()
            .map(|(service, check)| key(service, check))
            .collect();
        self.entries.retain(|key, _| seen.contains(key));
    }

    pub fn entry(&self, service: &str, check: &str) -> Option<&SmoothingEntry> {
        self.entries.get(&key(service, check))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
