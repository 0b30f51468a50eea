//! Per-tenant monitoring loop
//!
//! ```text
//! tick → fetch tenant config → build tree → queue checks → await all
//!      → smooth → group by service → POST one report per service
//! ```
//!
//! A tenant that no longer exists (404) ends the loop. Any other problem is
//! logged, reported to the hub and the cycle is skipped.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use futures::future::join_all;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::api::{ErrorLevel, ErrorReportDetails, StatusApi, StatusApiError};
use crate::model::{CheckIdentifier, HealthStatus, ServiceHealthReport, ServiceNode};
use crate::scheduler::{PendingHealthCheck, SchedulerHandle, SharedEvaluator};
use crate::smoothing::StatusSmoother;

/// What a single cycle ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Reports were posted for this many services
    Reported(usize),
    /// The cycle was skipped after an error
    Skipped,
    /// The hub no longer knows the tenant
    TenantRemoved,
    /// Cancellation fired while checks were running
    Cancelled,
}

/// Monitors the services of one tenant.
pub struct TenantMonitor {
    environment: String,
    tenant: String,
    api: Arc<dyn StatusApi>,
    scheduler: SchedulerHandle,
    evaluator: SharedEvaluator,
    smoother: StatusSmoother,
    interval: Duration,
}

impl TenantMonitor {
    pub fn new(
        environment: impl Into<String>,
        tenant: impl Into<String>,
        api: Arc<dyn StatusApi>,
        scheduler: SchedulerHandle,
        evaluator: SharedEvaluator,
        interval: Duration,
        smoothing_tolerance: u32,
    ) -> Self {
        Self {
            environment: environment.into(),
            tenant: tenant.into(),
            api,
            scheduler,
            evaluator,
            smoother: StatusSmoother::new(smoothing_tolerance),
            interval,
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Run cycles until cancelled or the tenant is removed.
    ///
    /// Returns an error only for problems that retrying cannot fix.
    #[instrument(skip(self, cancel), fields(environment = %self.environment, tenant = %self.tenant))]
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!("starting tenant monitor every {:?}", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("tenant monitor cancelled");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            match self.run_cycle(&cancel).await? {
                CycleOutcome::TenantRemoved => {
                    info!("tenant no longer exists, stopping monitor");
                    return Ok(());
                }
                CycleOutcome::Cancelled => return Ok(()),
                CycleOutcome::Reported(count) => debug!("reported {count} services"),
                CycleOutcome::Skipped => {}
            }
        }
    }

    /// Run one monitoring cycle.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<CycleOutcome> {
        let configuration = match self.api.get_tenant(&self.environment, &self.tenant).await {
            Ok(configuration) => configuration,
            Err(StatusApiError::NotFound) => return Ok(CycleOutcome::TenantRemoved),
            Err(StatusApiError::Unauthorized) => {
                bail!("hub rejected the API token for {}/{}", self.environment, self.tenant)
            }
            Err(e) => {
                warn!("failed to fetch tenant configuration: {e}");
                self.report_error(None, format!("failed to fetch tenant configuration: {e}"))
                    .await;
                return Ok(CycleOutcome::Skipped);
            }
        };

        let roots = match configuration.build_tree() {
            Ok(roots) => roots,
            Err(e) => {
                warn!("invalid tenant configuration: {e}");
                self.report_error(None, format!("invalid tenant configuration: {e}"))
                    .await;
                return Ok(CycleOutcome::Skipped);
            }
        };

        let (pending, queued) = self.queue_checks(&roots);
        trace!("queued {} checks", pending.len());

        let (keys, futures): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        let statuses = tokio::select! {
            _ = cancel.cancelled() => return Ok(CycleOutcome::Cancelled),
            statuses = join_all(futures) => statuses,
        };

        let mut by_service: BTreeMap<String, BTreeMap<String, HealthStatus>> = BTreeMap::new();
        for ((service, check), observed) in keys.iter().zip(statuses) {
            let status = self.smoother.smooth(service, check, observed);
            by_service
                .entry(service.clone())
                .or_default()
                .insert(check.clone(), status);
        }
        self.smoother
            .retain_observed(keys.iter().map(|(service, check)| (service.as_str(), check.as_str())));
        self.evaluator.retain_checks(&queued);

        let now = Utc::now();
        let mut reported = 0;
        for (service, checks) in by_service {
            let report = ServiceHealthReport::from_checks(now, checks);
            match self
                .api
                .record_status(&self.environment, &self.tenant, &service, &report)
                .await
            {
                Ok(()) => reported += 1,
                Err(e) => {
                    error!(%service, "failed to record status: {e}");
                    self.report_error(Some(&service), format!("failed to record status: {e}"))
                        .await;
                }
            }
        }

        Ok(CycleOutcome::Reported(reported))
    }

    /// Queue every check in the tree.
    ///
    /// Returns `((service, check), pending)` pairs and the identifiers queued.
    /// A service reachable through several parents appears more than once in
    /// the tree, but its checks are queued once per cycle.
    fn queue_checks(&self, roots: &[ServiceNode]) -> (Vec<((String, String), PendingHealthCheck)>, HashSet<CheckIdentifier>) {
        let mut pending = Vec::new();
        let mut queued = HashSet::new();

        for root in roots {
            root.walk(&mut |node: &ServiceNode| {
                for check in &node.health_checks {
                    let identifier =
                        CheckIdentifier::new(&self.environment, &self.tenant, &node.name, &check.name);
                    if !queued.insert(identifier.clone()) {
                        continue;
                    }
                    let future = self.scheduler.queue_health_check(
                        &self.tenant,
                        identifier,
                        check.clone(),
                        self.evaluator.clone(),
                    );
                    pending.push(((node.name.clone(), check.name.clone()), future));
                }
            });
        }

        (pending, queued)
    }

    async fn report_error(&self, service: Option<&str>, message: String) {
        let mut details = ErrorReportDetails::new(ErrorLevel::Error, message).tenant(&self.tenant);
        if let Some(service) = service {
            details = details.service(service);
        }

        if let Err(e) = self.api.create_error_report(&self.environment, &details).await {
            warn!("failed to file error report: {e}");
        }
    }
}
