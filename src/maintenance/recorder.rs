//! Periodic maintenance status recording

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::{MaintenanceError, MaintenanceRecord, MaintenanceScope, MaintenanceStore};
use crate::hub::ServiceHierarchySource;
use crate::storage::StorageError;
use crate::timeseries::{MetricLine, MetricWriter};

pub const MAINTENANCE_STATUS_METRIC: &str = "canopy_service_maintenance_status";

/// A service affected by a maintenance window.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct AffectedService {
    environment: String,
    tenant: String,
    service: String,
}

/// Writes maintenance status for every active window, one replica per window at a time.
pub struct MaintenanceRecorder {
    store: Arc<dyn MaintenanceStore>,
    hierarchy: Arc<dyn ServiceHierarchySource>,
    writer: Arc<dyn MetricWriter>,
    interval: Duration,
    stale_after: Duration,
}

impl MaintenanceRecorder {
    /// Locks older than three intervals are considered abandoned.
    pub fn new(
        store: Arc<dyn MaintenanceStore>,
        hierarchy: Arc<dyn ServiceHierarchySource>,
        writer: Arc<dyn MetricWriter>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            hierarchy,
            writer,
            interval,
            stale_after: interval * 3,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Run one recording pass at `now`.
    ///
    /// A record whose window has ended gets a final `0` and is deleted while
    /// still claimed. Every other claimed record is released again whatever
    /// happens. Errors do not stop the pass; the first one is returned once
    /// all records are handled.
    #[instrument(skip(self))]
    pub async fn record_once(&self, now: DateTime<Utc>) -> Result<usize, MaintenanceError> {
        let stale_after = TimeDelta::from_std(self.stale_after).unwrap_or(TimeDelta::MAX);
        let stale_before = now.checked_sub_signed(stale_after).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let claimed = self.store.claim(now, stale_before).await?;
        debug!("claimed {} maintenance records", claimed.len());

        let mut first_error: Option<MaintenanceError> = None;
        let mut recorded = 0;

        for record in claimed {
            match self.record(&record, now).await {
                Ok(()) => {
                    recorded += 1;
                    if record.end_time <= now {
                        info!(id = record.id, scope = %record.scope, "maintenance window ended");
                        match self.store.delete(record.id).await {
                            Ok(()) => continue,
                            Err(StorageError::NotFound(_)) => {
                                debug!(id = record.id, "maintenance record already deleted");
                                continue;
                            }
                            Err(e) => {
                                error!(id = record.id, "failed to delete maintenance record: {e}");
                                first_error.get_or_insert(e.into());
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(id = record.id, scope = %record.scope, "failed to record maintenance: {e}");
                    first_error.get_or_insert(e);
                }
            }

            if let Err(e) = self.store.release(record.id).await {
                error!(id = record.id, "failed to release maintenance record: {e}");
                first_error.get_or_insert(e.into());
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(recorded),
        }
    }

    async fn record(&self, record: &MaintenanceRecord, now: DateTime<Utc>) -> Result<(), MaintenanceError> {
        let value = if now < record.end_time { 1.0 } else { 0.0 };
        let services = self.affected_services(&record.scope).await?;

        let lines = services
            .into_iter()
            .map(|affected| {
                MetricLine::new(MAINTENANCE_STATUS_METRIC, value, now)
                    .label("environment", affected.environment)
                    .label("tenant", affected.tenant)
                    .label("service", affected.service)
            })
            .collect::<Vec<_>>();

        debug!(scope = %record.scope, value, "writing {} maintenance lines", lines.len());
        self.writer.write(lines).await?;
        Ok(())
    }

    async fn affected_services(&self, scope: &MaintenanceScope) -> Result<Vec<AffectedService>, MaintenanceError> {
        let mut affected = Vec::new();

        match scope {
            MaintenanceScope::Environment { environment } => {
                for tenant in self.hierarchy.tenants(environment).await {
                    self.collect_tenant(environment, &tenant, None, &mut affected).await?;
                }
            }
            MaintenanceScope::Tenant { environment, tenant } => {
                self.collect_tenant(environment, tenant, None, &mut affected).await?;
            }
            MaintenanceScope::Service {
                environment,
                tenant,
                service,
            } => {
                self.collect_tenant(environment, tenant, Some(service), &mut affected)
                    .await?;
                if affected.is_empty() {
                    warn!(%scope, "service is not configured, recording it alone");
                    affected.push(AffectedService {
                        environment: environment.clone(),
                        tenant: tenant.clone(),
                        service: service.clone(),
                    });
                }
            }
        }

        affected.sort();
        affected.dedup();
        Ok(affected)
    }

    /// Add the services of one tenant, or of one service subtree when `service` is set.
    async fn collect_tenant(
        &self,
        environment: &str,
        tenant: &str,
        service: Option<&String>,
        affected: &mut Vec<AffectedService>,
    ) -> Result<(), MaintenanceError> {
        let Some(configuration) = self.hierarchy.tenant(environment, tenant).await else {
            return Ok(());
        };
        let roots = configuration.build_tree()?;

        let names: Vec<String> = match service {
            Some(service) => roots
                .iter()
                .find_map(|root| root.find(service))
                .map(|node| node.descendant_names())
                .unwrap_or_default(),
            None => roots.iter().flat_map(|root| root.descendant_names()).collect(),
        };

        affected.extend(names.into_iter().map(|service| AffectedService {
            environment: environment.to_string(),
            tenant: tenant.to_string(),
            service,
        }));
        Ok(())
    }

    /// Record on every tick until `cancel` fires.
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: CancellationToken) {
        info!("starting maintenance recorder every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.record_once(Utc::now()).await {
                        Ok(count) if count > 0 => debug!("recorded {count} maintenance windows"),
                        Ok(_) => {}
                        Err(e) => error!("maintenance recording failed: {e}"),
                    }
                }
            }
        }

        info!("maintenance recorder stopped");
    }
}
