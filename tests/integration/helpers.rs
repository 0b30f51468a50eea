//! Helper functions for integration tests

use std::time::Duration;

use canopy::model::{
    ComparisonOperator, HealthCheck, HealthCheckDefinition, HealthStatus, HttpCheckDefinition,
    HttpCondition, MetricCheckDefinition, MetricCondition, ServiceConfiguration,
    TenantConfiguration,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

pub fn http_definition(url: impl Into<String>, conditions: Vec<HttpCondition>) -> HttpCheckDefinition {
    HttpCheckDefinition {
        url: url.into(),
        conditions,
        follow_redirects: true,
        authorization_header: None,
        skip_certificate_validation: false,
    }
}

pub fn http_check(name: &str, url: impl Into<String>, conditions: Vec<HttpCondition>) -> HealthCheck {
    HealthCheck {
        name: name.to_string(),
        description: None,
        definition: HealthCheckDefinition::HttpRequest(http_definition(url, conditions)),
    }
}

pub fn expect_codes(codes: &[u16]) -> HttpCondition {
    HttpCondition::StatusCode {
        status_codes: codes.to_vec(),
        status: HealthStatus::Online,
    }
}

pub fn metric_definition(expression: &str, threshold: f64, status: HealthStatus) -> MetricCheckDefinition {
    MetricCheckDefinition {
        duration: Duration::from_secs(300),
        expression: expression.to_string(),
        conditions: vec![MetricCondition {
            operator: ComparisonOperator::GreaterThan,
            threshold,
            status,
        }],
    }
}

pub fn service(name: &str, checks: Vec<HealthCheck>, children: &[&str]) -> ServiceConfiguration {
    ServiceConfiguration {
        name: name.to_string(),
        display_name: name.to_uppercase(),
        description: None,
        url: None,
        health_checks: checks,
        children: children.iter().map(|c| c.to_string()).collect(),
    }
}

pub fn tenant(services: Vec<ServiceConfiguration>, roots: &[&str]) -> TenantConfiguration {
    TenantConfiguration {
        services,
        root_services: roots.iter().map(|r| r.to_string()).collect(),
    }
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

/// Prometheus `query_range` response with a single series, timestamps relative to [`at`].
pub fn matrix_response(values: &[(i64, f64)]) -> serde_json::Value {
    let values: Vec<serde_json::Value> = values
        .iter()
        .map(|(ts, value)| json!([at(*ts).timestamp(), value.to_string()]))
        .collect();

    json!({
        "status": "success",
        "data": {
            "resultType": "matrix",
            "result": [{ "metric": { "job": "api" }, "values": values }]
        }
    })
}
