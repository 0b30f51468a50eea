//! Uploads the raw samples behind each metric check to the hub

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace, warn};

use super::MetricQueryRunner;
use crate::agent::api::StatusApi;
use crate::model::CheckIdentifier;
use crate::timeseries::{CheckSamples, Sample, TimeSeriesError, TimeSeriesResult};

/// Decorator that forwards fetched samples to the status API.
///
/// Uploads run in the background and never affect the query result.
pub struct ReportingQueryRunner {
    inner: Arc<dyn MetricQueryRunner>,
    api: Arc<dyn StatusApi>,
}

impl ReportingQueryRunner {
    pub fn new(inner: Arc<dyn MetricQueryRunner>, api: Arc<dyn StatusApi>) -> Self {
        Self { inner, api }
    }
}

#[async_trait]
impl MetricQueryRunner for ReportingQueryRunner {
    #[instrument(skip(self, cancel), fields(check = %identifier))]
    async fn query_range(
        &self,
        identifier: &CheckIdentifier,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> TimeSeriesResult<Vec<Sample>> {
        let samples = self
            .inner
            .query_range(identifier, expression, start, end, cancel)
            .await?;

        let api = self.api.clone();
        let id = identifier.clone();
        let upload = CheckSamples::from([(id.check().to_string(), samples.clone())]);
        tokio::spawn(async move {
            match api
                .record_check_samples(id.environment(), id.tenant(), id.service(), &upload)
                .await
            {
                Ok(()) => trace!(check = %id, "uploaded samples"),
                Err(e) => warn!(check = %id, "failed to upload samples: {e}"),
            }
        });

        if cancel.is_cancelled() {
            return Err(TimeSeriesError::Cancelled);
        }

        Ok(samples)
    }

    fn retain_checks(&self, observed: &HashSet<CheckIdentifier>) {
        self.inner.retain_checks(observed);
    }
}
