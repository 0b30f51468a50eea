//! Hierarchical status aggregation
//!
//! A service's status is the worst of its own reported status and the
//! statuses of its children, with two twists:
//!
//! - missing data is never optimistic: a child without a status, or with
//!   `Unknown`, makes the parent `Unknown`;
//! - a service that has checks but no reported status is `Unknown` no matter
//!   what its children report.
//!
//! The timestamp of an aggregate is the oldest timestamp that went into it,
//! so a fresh parent over a stale child still looks stale.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{HealthStatus, ServiceHealthReport, ServiceNode};

/// Aggregated view of one service and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealthData {
    pub name: String,
    pub display_name: String,
    pub status: Option<HealthStatus>,
    pub timestamp: Option<DateTime<Utc>>,
    pub health_checks: BTreeMap<String, HealthStatus>,
    pub children: Vec<ServiceHealthData>,
}

impl ServiceHealthData {
    /// Status and timestamp of this subtree, as seen by its parent.
    pub fn rollup(&self) -> StatusRollup {
        StatusRollup {
            status: self.status,
            timestamp: self.timestamp,
        }
    }
}

/// Status and timestamp carried through a fold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRollup {
    pub status: Option<HealthStatus>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl StatusRollup {
    /// Combine with one child.
    ///
    /// Returns `true` once the result is `Unknown` and further children cannot
    /// change it.
    fn absorb(&mut self, child: StatusRollup) -> bool {
        match child.status {
            None | Some(HealthStatus::Unknown) => {
                self.status = Some(HealthStatus::Unknown);
                true
            }
            Some(status) => {
                self.status = Some(self.status.map_or(status, |own| own.worst(status)));
                self.timestamp = oldest(self.timestamp, child.timestamp);
                false
            }
        }
    }

    fn is_unknown(&self) -> bool {
        self.status == Some(HealthStatus::Unknown)
    }
}

fn oldest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn fold(mut rollup: StatusRollup, children: impl IntoIterator<Item = StatusRollup>) -> StatusRollup {
    if rollup.is_unknown() {
        return rollup;
    }
    for child in children {
        if rollup.absorb(child) {
            break;
        }
    }
    rollup
}

/// Aggregate `node` and its subtree using `lookup` for each service's own record.
pub fn aggregate<F>(node: &ServiceNode, lookup: &F) -> ServiceHealthData
where
    F: Fn(&ServiceNode) -> Option<ServiceHealthReport>,
{
    let children: Vec<ServiceHealthData> = node
        .children
        .iter()
        .map(|child| aggregate(child, lookup))
        .collect();

    let own = lookup(node);

    let (rollup, health_checks) = match own {
        None if !node.health_checks.is_empty() => (
            StatusRollup {
                status: Some(HealthStatus::Unknown),
                timestamp: None,
            },
            BTreeMap::new(),
        ),
        None => (
            fold(StatusRollup::default(), children.iter().map(ServiceHealthData::rollup)),
            BTreeMap::new(),
        ),
        Some(report) => {
            let start = StatusRollup {
                status: Some(report.aggregate_status),
                timestamp: Some(report.timestamp),
            };
            (
                fold(start, children.iter().map(ServiceHealthData::rollup)),
                report.health_checks,
            )
        }
    };

    ServiceHealthData {
        name: node.name.clone(),
        display_name: node.display_name.clone(),
        status: rollup.status,
        timestamp: rollup.timestamp,
        health_checks,
        children,
    }
}

/// Roll a set of aggregated roots up into one status (tenant or environment level).
///
/// No roots yields no status.
pub fn aggregate_roots<'a>(roots: impl IntoIterator<Item = &'a ServiceHealthData>) -> StatusRollup {
    combine(roots.into_iter().map(ServiceHealthData::rollup))
}

/// Fold already rolled-up statuses, e.g. tenants into their environment.
pub fn combine(rollups: impl IntoIterator<Item = StatusRollup>) -> StatusRollup {
    fold(StatusRollup::default(), rollups)
}
