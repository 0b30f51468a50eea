//! Bounded-concurrency health check scheduler
//!
//! Tenant loops queue their checks through a [`SchedulerHandle`] and get a
//! [`PendingHealthCheck`] future back immediately. A single
//! [`HealthCheckScheduler::run`] loop drains the shared [`FairQueue`] and keeps
//! at most `max_concurrency` evaluations in flight, no matter how many
//! tenants or checks are queued.
//!
//! ```text
//! TenantMonitor(a) ─┐                       ┌─> evaluate ─┐
//! TenantMonitor(b) ─┼─> FairQueue ─> run() ─┼─> evaluate ─┼─> oneshot -> PendingHealthCheck
//! TenantMonitor(c) ─┘    (per tenant)       └─> ...  (≤ max_concurrency)
//! ```
//!
//! The queue is unbounded: each tenant loop enqueues exactly one cycle of
//! checks and waits for all of them before enqueueing more.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{Notify, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace};

use crate::checks::HealthCheckEvaluator;
use crate::model::{CheckIdentifier, HealthCheck, HealthCheckDefinition, HealthStatus, fold_name};
use crate::queue::{FairQueue, QueueItem};

/// Evaluator used for queued checks.
pub type SharedEvaluator = Arc<dyn HealthCheckEvaluator<HealthCheckDefinition>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The run loop stopped because its cancellation token fired.
    Cancelled,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::Cancelled => write!(f, "health check scheduler was cancelled"),
        }
    }
}

impl std::error::Error for SchedulerError {}

/// A queued evaluation together with its completion handle.
pub struct HealthCheckWorkItem {
    tenant: String,
    identifier: CheckIdentifier,
    check: Arc<HealthCheck>,
    evaluator: SharedEvaluator,
    respond_to: oneshot::Sender<HealthStatus>,
}

impl QueueItem for HealthCheckWorkItem {
    type Key = String;

    fn queue_key(&self) -> Self::Key {
        fold_name(&self.tenant)
    }
}

impl HealthCheckWorkItem {
    async fn evaluate(self, cancel: CancellationToken) {
        let status = self
            .evaluator
            .evaluate(&self.identifier, &self.check.definition, &cancel)
            .await;

        trace!(check = %self.identifier, %status, "health check evaluated");

        // the tenant loop may have stopped waiting; that is fine
        let _ = self.respond_to.send(status);
    }
}

/// Future resolving to the status of a queued check.
///
/// Resolves to `Unknown` if the work item is dropped without being evaluated
/// (scheduler cancelled, evaluator panicked).
pub struct PendingHealthCheck {
    identifier: CheckIdentifier,
    receiver: oneshot::Receiver<HealthStatus>,
}

impl PendingHealthCheck {
    pub fn identifier(&self) -> &CheckIdentifier {
        &self.identifier
    }
}

impl Future for PendingHealthCheck {
    type Output = HealthStatus;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(HealthStatus::Unknown))
    }
}

/// Cloneable producer side of the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    queue: Arc<FairQueue<HealthCheckWorkItem>>,
    notify: Arc<Notify>,
}

impl SchedulerHandle {
    /// Queue a check for evaluation. Never blocks.
    pub fn queue_health_check(
        &self,
        tenant: &str,
        identifier: CheckIdentifier,
        check: Arc<HealthCheck>,
        evaluator: SharedEvaluator,
    ) -> PendingHealthCheck {
        let (respond_to, receiver) = oneshot::channel();

        self.queue.enqueue(HealthCheckWorkItem {
            tenant: tenant.to_string(),
            identifier: identifier.clone(),
            check,
            evaluator,
            respond_to,
        });
        self.notify.notify_one();

        PendingHealthCheck {
            identifier,
            receiver,
        }
    }

    /// Checks queued but not yet started.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

pub struct HealthCheckScheduler {
    queue: Arc<FairQueue<HealthCheckWorkItem>>,
    notify: Arc<Notify>,
    max_concurrency: usize,
}

impl HealthCheckScheduler {
    /// Create a scheduler; a `max_concurrency` of zero is treated as one.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            queue: Arc::new(FairQueue::new()),
            notify: Arc::new(Notify::new()),
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            queue: self.queue.clone(),
            notify: self.notify.clone(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Evaluate queued checks until `cancel` fires.
    ///
    /// Always returns [`SchedulerError::Cancelled`]; evaluations still in
    /// flight see their child token cancelled and are aborted.
    #[instrument(skip_all, fields(max_concurrency = self.max_concurrency))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        debug!("starting health check scheduler");

        let mut running = JoinSet::new();

        loop {
            while running.len() < self.max_concurrency {
                let Some(item) = self.queue.try_dequeue() else {
                    break;
                };
                running.spawn(item.evaluate(cancel.child_token()));
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(in_flight = running.len(), pending = self.queue.len(), "scheduler cancelled");
                    running.abort_all();
                    return Err(SchedulerError::Cancelled);
                }

                Some(result) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!("health check evaluation panicked: {e}");
                        }
                    }
                }

                _ = self.notify.notified() => {
                    trace!("work queued");
                }
            }
        }
    }
}
