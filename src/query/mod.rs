//! Metric query runners
//!
//! A [`MetricQueryRunner`] fetches the samples of one check's expression over
//! a time window. Runners stack as decorators:
//!
//! ```text
//! ReportingQueryRunner -> CachingQueryRunner -> BackendQueryRunner -> backend
//! ```

pub mod cache;
pub mod reporting;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use crate::model::CheckIdentifier;
use crate::timeseries::{Sample, TimeSeriesClient, TimeSeriesError, TimeSeriesResult};

pub use cache::CachingQueryRunner;
pub use reporting::ReportingQueryRunner;

/// Fetches samples of a single series over `[start, end]`.
#[async_trait]
pub trait MetricQueryRunner: Send + Sync {
    async fn query_range(
        &self,
        identifier: &CheckIdentifier,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> TimeSeriesResult<Vec<Sample>>;

    /// Drop per-check state for every check not in `observed`.
    fn retain_checks(&self, _observed: &HashSet<CheckIdentifier>) {}
}

/// Runs range queries directly against a backend.
#[derive(Debug, Clone)]
pub struct BackendQueryRunner {
    client: TimeSeriesClient,
    step: Duration,
}

impl BackendQueryRunner {
    pub fn new(client: TimeSeriesClient, step: Duration) -> Self {
        Self { client, step }
    }
}

#[async_trait]
impl MetricQueryRunner for BackendQueryRunner {
    #[instrument(skip(self, cancel), fields(check = %identifier))]
    async fn query_range(
        &self,
        identifier: &CheckIdentifier,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> TimeSeriesResult<Vec<Sample>> {
        let mut series = tokio::select! {
            _ = cancel.cancelled() => return Err(TimeSeriesError::Cancelled),
            series = self.client.query_range(expression, start, end, self.step) => series?,
        };

        match series.len() {
            0 => Ok(Vec::new()),
            1 => {
                let samples = series.remove(0).samples;
                trace!("fetched {} samples", samples.len());
                Ok(samples)
            }
            n => Err(TimeSeriesError::AmbiguousResult(n)),
        }
    }
}
