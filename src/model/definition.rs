//! Health check definitions
//!
//! Checks and their conditions are closed unions: every evaluator matches on
//! the tag exhaustively, so a new check kind fails to compile until each
//! consumer handles it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::status::HealthStatus;

/// A named health check attached to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub definition: HealthCheckDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HealthCheckDefinition {
    HttpRequest(HttpCheckDefinition),
    PrometheusMetric(MetricCheckDefinition),
    LokiMetric(MetricCheckDefinition),
}

impl HealthCheckDefinition {
    pub fn kind(&self) -> &'static str {
        match self {
            HealthCheckDefinition::HttpRequest(_) => "HttpRequest",
            HealthCheckDefinition::PrometheusMetric(_) => "PrometheusMetric",
            HealthCheckDefinition::LokiMetric(_) => "LokiMetric",
        }
    }

    /// Statuses configured on the definition's conditions.
    pub fn condition_statuses(&self) -> Vec<HealthStatus> {
        match self {
            HealthCheckDefinition::HttpRequest(http) => {
                http.conditions.iter().map(HttpCondition::status).collect()
            }
            HealthCheckDefinition::PrometheusMetric(metric)
            | HealthCheckDefinition::LokiMetric(metric) => {
                metric.conditions.iter().map(|c| c.status).collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCheckDefinition {
    pub url: String,
    #[serde(default)]
    pub conditions: Vec<HttpCondition>,
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_header: Option<String>,
    #[serde(default)]
    pub skip_certificate_validation: bool,
}

fn default_follow_redirects() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum HttpCondition {
    /// Matches when the response status code is one of `status_codes`.
    StatusCode {
        status_codes: Vec<u16>,
        status: HealthStatus,
    },
    /// Matches when the request took longer than `response_time`.
    ResponseTime {
        #[serde(with = "duration_millis")]
        response_time: Duration,
        status: HealthStatus,
    },
    /// Matches when the JSONPath `path` selects a value matching the regex `value`.
    HttpBodyJson {
        path: String,
        value: String,
        status: HealthStatus,
    },
    /// Matches when the XPath `path` evaluates to a string matching the regex `value`.
    HttpBodyXml {
        path: String,
        value: String,
        status: HealthStatus,
    },
}

impl HttpCondition {
    pub fn status(&self) -> HealthStatus {
        match self {
            HttpCondition::StatusCode { status, .. }
            | HttpCondition::ResponseTime { status, .. }
            | HttpCondition::HttpBodyJson { status, .. }
            | HttpCondition::HttpBodyXml { status, .. } => *status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricCheckDefinition {
    /// Length of the sample window ending now.
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub expression: String,
    #[serde(default)]
    pub conditions: Vec<MetricCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricCondition {
    pub operator: ComparisonOperator,
    pub threshold: f64,
    pub status: HealthStatus,
}

impl MetricCondition {
    /// True when every sample satisfies `sample <operator> threshold`.
    pub fn matches_all(&self, values: impl IntoIterator<Item = f64>) -> bool {
        values
            .into_iter()
            .all(|value| self.operator.compare(value, self.threshold))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl ComparisonOperator {
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::Equal => value == threshold,
            ComparisonOperator::NotEqual => value != threshold,
            ComparisonOperator::GreaterThan => value > threshold,
            ComparisonOperator::GreaterThanOrEqual => value >= threshold,
            ComparisonOperator::LessThan => value < threshold,
            ComparisonOperator::LessThanOrEqual => value <= threshold,
        }
    }
}

pub(crate) mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
