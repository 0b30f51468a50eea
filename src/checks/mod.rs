//! Health check evaluators
//!
//! An evaluator turns a check definition plus live data into a
//! [`HealthStatus`]. Evaluators never fail: transport problems, malformed
//! responses and cancellation are all mapped to a status.
//!
//! - [`http::HttpCheckEvaluator`]: one HTTP request, conditions on status code,
//!   elapsed time and body values
//! - [`metric::MetricCheckEvaluator`]: threshold conditions over a sample
//!   window fetched through a [`MetricQueryRunner`](crate::query::MetricQueryRunner)
//! - [`CheckEvaluator`]: dispatches on the definition variant

pub mod http;
pub mod metric;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::model::{
    CheckIdentifier, HealthCheckDefinition, HealthStatus, HttpCheckDefinition,
    MetricCheckDefinition,
};

pub use http::HttpCheckEvaluator;
pub use metric::MetricCheckEvaluator;

/// Evaluates definitions of type `D`.
#[async_trait]
pub trait HealthCheckEvaluator<D: Sync>: Send + Sync {
    async fn evaluate(
        &self,
        identifier: &CheckIdentifier,
        definition: &D,
        cancel: &CancellationToken,
    ) -> HealthStatus;

    /// Forget cached state of checks not in `observed`.
    fn retain_checks(&self, _observed: &HashSet<CheckIdentifier>) {}
}

/// Routes each definition variant to its evaluator.
///
/// A metric backend that is not configured evaluates to `Unknown`.
#[derive(Clone)]
pub struct CheckEvaluator {
    http: Arc<dyn HealthCheckEvaluator<HttpCheckDefinition>>,
    prometheus: Option<Arc<dyn HealthCheckEvaluator<MetricCheckDefinition>>>,
    loki: Option<Arc<dyn HealthCheckEvaluator<MetricCheckDefinition>>>,
}

impl CheckEvaluator {
    pub fn new(http: Arc<dyn HealthCheckEvaluator<HttpCheckDefinition>>) -> Self {
        Self {
            http,
            prometheus: None,
            loki: None,
        }
    }

    pub fn with_prometheus(mut self, evaluator: Arc<dyn HealthCheckEvaluator<MetricCheckDefinition>>) -> Self {
        self.prometheus = Some(evaluator);
        self
    }

    pub fn with_loki(mut self, evaluator: Arc<dyn HealthCheckEvaluator<MetricCheckDefinition>>) -> Self {
        self.loki = Some(evaluator);
        self
    }
}

#[async_trait]
impl HealthCheckEvaluator<HealthCheckDefinition> for CheckEvaluator {
    async fn evaluate(
        &self,
        identifier: &CheckIdentifier,
        definition: &HealthCheckDefinition,
        cancel: &CancellationToken,
    ) -> HealthStatus {
        match definition {
            HealthCheckDefinition::HttpRequest(http) => {
                self.http.evaluate(identifier, http, cancel).await
            }
            HealthCheckDefinition::PrometheusMetric(metric) => match &self.prometheus {
                Some(evaluator) => evaluator.evaluate(identifier, metric, cancel).await,
                None => {
                    warn!(check = %identifier, "no prometheus backend configured");
                    HealthStatus::Unknown
                }
            },
            HealthCheckDefinition::LokiMetric(metric) => match &self.loki {
                Some(evaluator) => evaluator.evaluate(identifier, metric, cancel).await,
                None => {
                    warn!(check = %identifier, "no loki backend configured");
                    HealthStatus::Unknown
                }
            },
        }
    }

    fn retain_checks(&self, observed: &HashSet<CheckIdentifier>) {
        self.http.retain_checks(observed);
        for evaluator in [&self.prometheus, &self.loki].into_iter().flatten() {
            evaluator.retain_checks(observed);
        }
    }
}
