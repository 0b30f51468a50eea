//! Window caching for repeated range queries
//!
//! Metric checks query a sliding window (`[now - duration, now]`) every cycle,
//! so consecutive windows mostly overlap. The cache keeps the last window per
//! check and expression and only fetches the part that is new.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace};

use super::MetricQueryRunner;
use crate::model::CheckIdentifier;
use crate::timeseries::{Sample, TimeSeriesResult};

/// Samples fetched for `[start, end]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub samples: Vec<Sample>,
}

type CacheKey = (CheckIdentifier, String);

/// Decorator serving overlapping windows from memory.
pub struct CachingQueryRunner {
    inner: Arc<dyn MetricQueryRunner>,
    windows: Mutex<HashMap<CacheKey, CachedTimeWindow>>,
}

impl CachingQueryRunner {
    pub fn new(inner: Arc<dyn MetricQueryRunner>) -> Self {
        Self {
            inner,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached windows.
    pub fn len(&self) -> usize {
        self.windows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.lock().is_empty()
    }

    fn cached(&self, key: &CacheKey) -> Option<CachedTimeWindow> {
        self.windows.lock().get(key).cloned()
    }

    fn store(&self, key: CacheKey, window: CachedTimeWindow) {
        self.windows.lock().insert(key, window);
    }
}

/// Combine the cached window with freshly fetched samples for `[start, end]`.
///
/// Cached samples before `start` are dropped and fetched samples not newer than
/// the last cached one are skipped.
fn stitch(cached: &CachedTimeWindow, start: DateTime<Utc>, delta: Vec<Sample>) -> Vec<Sample> {
    let mut samples: Vec<Sample> = cached
        .samples
        .iter()
        .filter(|sample| sample.timestamp >= start)
        .copied()
        .collect();

    let last = cached.samples.last().map(|sample| sample.timestamp);
    samples.extend(
        delta
            .into_iter()
            .filter(|sample| last.is_none_or(|last| sample.timestamp > last)),
    );
    samples
}

#[async_trait]
impl MetricQueryRunner for CachingQueryRunner {
    #[instrument(skip(self, cancel), fields(check = %identifier))]
    async fn query_range(
        &self,
        identifier: &CheckIdentifier,
        expression: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> TimeSeriesResult<Vec<Sample>> {
        let key = (identifier.clone(), expression.to_string());

        let cached = self
            .cached(&key)
            .filter(|cached| cached.start <= start && start <= cached.end);

        let samples = match cached {
            Some(cached) => {
                let delta = if end <= cached.end {
                    Vec::new()
                } else {
                    trace!("fetching delta from {} to {}", cached.end, end);
                    self.inner
                        .query_range(identifier, expression, cached.end, end, cancel)
                        .await?
                };
                stitch(&cached, start, delta)
            }
            None => {
                trace!("fetching full window");
                self.inner
                    .query_range(identifier, expression, start, end, cancel)
                    .await?
            }
        };

        self.store(
            key,
            CachedTimeWindow {
                start,
                end,
                samples: samples.clone(),
            },
        );

        Ok(samples)
    }

    fn retain_checks(&self, observed: &HashSet<CheckIdentifier>) {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|(identifier, _), _| observed.contains(identifier));
        if windows.len() < before {
            trace!("evicted {} cached windows", before - windows.len());
        }
        drop(windows);

        self.inner.retain_checks(observed);
    }
}
