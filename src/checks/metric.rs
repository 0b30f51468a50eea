//! Metric threshold evaluation
//!
//! A condition matches only when every sample in the window satisfies
//! `sample <operator> threshold`. The most severe matching condition wins and
//! `Online` is the result when none match.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::HealthCheckEvaluator;
use crate::model::{CheckIdentifier, HealthStatus, MetricCheckDefinition, MetricCondition};
use crate::query::MetricQueryRunner;
use crate::timeseries::Sample;

/// Judge a sample window against threshold conditions.
///
/// An empty window carries no evidence and is `Unknown`.
pub fn evaluate_samples(conditions: &[MetricCondition], samples: &[Sample]) -> HealthStatus {
    if samples.is_empty() {
        return HealthStatus::Unknown;
    }

    let matched = conditions
        .iter()
        .filter(|condition| condition.matches_all(samples.iter().map(|s| s.value)))
        .map(|condition| condition.status);

    HealthStatus::most_severe(matched).unwrap_or(HealthStatus::Online)
}

/// Evaluates [`MetricCheckDefinition`]s through a query runner.
///
/// The same type serves Prometheus and Loki checks; only the runner differs.
#[derive(Clone)]
pub struct MetricCheckEvaluator {
    runner: Arc<dyn MetricQueryRunner>,
}

impl MetricCheckEvaluator {
    pub fn new(runner: Arc<dyn MetricQueryRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl HealthCheckEvaluator<MetricCheckDefinition> for MetricCheckEvaluator {
    #[instrument(skip_all, fields(check = %identifier))]
    async fn evaluate(
        &self,
        identifier: &CheckIdentifier,
        definition: &MetricCheckDefinition,
        cancel: &CancellationToken,
    ) -> HealthStatus {
        let end = Utc::now();
        let window = match TimeDelta::from_std(definition.duration) {
            Ok(window) => window,
            Err(e) => {
                warn!("invalid window {:?}: {e}", definition.duration);
                return HealthStatus::Unknown;
            }
        };
        let start = end - window;

        let samples = match self
            .runner
            .query_range(identifier, &definition.expression, start, end, cancel)
            .await
        {
            Ok(samples) => samples,
            Err(e) if e.is_cancelled() => {
                debug!("evaluation cancelled");
                return HealthStatus::Unknown;
            }
            Err(e) => {
                warn!("query failed: {e}");
                return HealthStatus::Unknown;
            }
        };

        let status = evaluate_samples(&definition.conditions, &samples);
        debug!(samples = samples.len(), %status, "evaluated metric check");
        status
    }

    fn retain_checks(&self, observed: &HashSet<CheckIdentifier>) {
        self.runner.retain_checks(observed);
    }
}
