//! Health status and the reported status wire shape

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Health of a check, a service or an aggregate.
///
/// `Online < Degraded < AtRisk < Offline` form the severity scale. `Unknown`
/// is not on the scale: it means the data itself is indeterminate and always
/// wins when statuses are combined. The enum deliberately does not implement
/// `PartialOrd`; compare through [`HealthStatus::severity`] or
/// [`HealthStatus::worst`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    Unknown,
    Online,
    Degraded,
    AtRisk,
    Offline,
}

impl HealthStatus {
    /// All statuses, in the order they are written as metric labels.
    pub const ALL: [HealthStatus; 5] = [
        HealthStatus::Unknown,
        HealthStatus::Online,
        HealthStatus::Degraded,
        HealthStatus::AtRisk,
        HealthStatus::Offline,
    ];

    /// Position on the severity scale, `None` for `Unknown`.
    pub fn severity(self) -> Option<u8> {
        match self {
            HealthStatus::Unknown => None,
            HealthStatus::Online => Some(0),
            HealthStatus::Degraded => Some(1),
            HealthStatus::AtRisk => Some(2),
            HealthStatus::Offline => Some(3),
        }
    }

    pub fn is_unknown(self) -> bool {
        self == HealthStatus::Unknown
    }

    /// Combine two statuses: `Unknown` if either is `Unknown`, otherwise the
    /// more severe of the two.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        match (self.severity(), other.severity()) {
            (Some(a), Some(b)) => {
                if b > a {
                    other
                } else {
                    self
                }
            }
            _ => HealthStatus::Unknown,
        }
    }

    /// The most severe status on the scale among `statuses`, ignoring
    /// `Unknown`. Returns `None` when no ordered status is present.
    pub fn most_severe(statuses: impl IntoIterator<Item = HealthStatus>) -> Option<HealthStatus> {
        statuses
            .into_iter()
            .filter_map(|status| status.severity().map(|severity| (severity, status)))
            .max_by_key(|(severity, _)| *severity)
            .map(|(_, status)| status)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Unknown => "Unknown",
            HealthStatus::Online => "Online",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::AtRisk => "AtRisk",
            HealthStatus::Offline => "Offline",
        }
    }

    pub fn parse(value: &str) -> Option<HealthStatus> {
        HealthStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one service as reported by an agent.
///
/// This is the wire shape the hub stores; field names and the timestamp
/// format must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealthReport {
    #[serde(with = "rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub aggregate_status: HealthStatus,
    pub health_checks: BTreeMap<String, HealthStatus>,
}

impl ServiceHealthReport {
    /// Build a report whose aggregate is the worst of the check statuses.
    ///
    /// A service without checks reports `Online`.
    pub fn from_checks(timestamp: DateTime<Utc>, health_checks: BTreeMap<String, HealthStatus>) -> Self {
        let aggregate_status = health_checks
            .values()
            .copied()
            .fold(HealthStatus::Online, HealthStatus::worst);

        Self {
            timestamp,
            aggregate_status,
            health_checks,
        }
    }
}

/// RFC3339 UTC with a `Z` suffix and second precision.
pub(crate) mod rfc3339 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
