//! Starts and stops tenant monitors as tenants come and go
//!
//! Tenant discovery is push based: a source sends [`TenantEvent`]s into the
//! supervisor's channel. The static file source sends one `Created` per
//! configured tenant and then stays quiet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::api::StatusApi;
use super::monitor::TenantMonitor;
use crate::model::fold_name;
use crate::scheduler::{SchedulerHandle, SharedEvaluator};

/// A change in the set of monitored tenants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantEvent {
    Created { environment: String, tenant: String },
    ConfigChanged { environment: String, tenant: String },
    Removed { environment: String, tenant: String },
}

type TenantKey = (String, String);

fn key(environment: &str, tenant: &str) -> TenantKey {
    (fold_name(environment), fold_name(tenant))
}

/// Builds the evaluator chain for one tenant monitor.
///
/// Called once per started monitor, so per-check caches belong to a single
/// tenant and are dropped with its loop.
pub type EvaluatorFactory = Arc<dyn Fn() -> SharedEvaluator + Send + Sync>;

/// Monitor settings shared by every tenant.
#[derive(Clone)]
pub struct MonitorSettings {
    pub api: Arc<dyn StatusApi>,
    pub scheduler: SchedulerHandle,
    pub evaluators: EvaluatorFactory,
    pub interval: Duration,
    pub smoothing_tolerance: u32,
}

/// Owns one task per monitored tenant.
pub struct AgentSupervisor {
    settings: MonitorSettings,
    events: mpsc::Receiver<TenantEvent>,
    monitors: HashMap<TenantKey, CancellationToken>,
    tasks: JoinSet<(TenantKey, anyhow::Result<()>)>,
}

impl AgentSupervisor {
    /// Create a supervisor and the sender used to feed it tenant events.
    pub fn new(settings: MonitorSettings) -> (Self, mpsc::Sender<TenantEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (
            Self {
                settings,
                events: rx,
                monitors: HashMap::new(),
                tasks: JoinSet::new(),
            },
            tx,
        )
    }

    /// Number of tenants currently monitored.
    pub fn monitored(&self) -> usize {
        self.monitors.len()
    }

    /// Process events until `shutdown` fires.
    ///
    /// A monitor that fails or panics cancels `shutdown`, stopping the whole
    /// agent.
    #[instrument(skip_all)]
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("agent supervisor started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,

                Some(event) = self.events.recv() => self.handle_event(event, &shutdown),

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok((key, Ok(()))) => {
                        debug!(environment = %key.0, tenant = %key.1, "tenant monitor finished");
                        self.monitors.remove(&key);
                    }
                    Ok((key, Err(e))) => {
                        error!(environment = %key.0, tenant = %key.1, "tenant monitor failed: {e:#}");
                        shutdown.cancel();
                    }
                    Err(e) => {
                        error!("tenant monitor panicked: {e}");
                        shutdown.cancel();
                    }
                },
            }
        }

        for token in self.monitors.values() {
            token.cancel();
        }
        while self.tasks.join_next().await.is_some() {}
        info!("agent supervisor stopped");
    }

    fn handle_event(&mut self, event: TenantEvent, shutdown: &CancellationToken) {
        match event {
            TenantEvent::Created { environment, tenant } => {
                self.start(&environment, &tenant, shutdown);
            }
            TenantEvent::ConfigChanged { environment, tenant } => {
                // configuration is fetched every cycle; only start missing monitors
                if !self.monitors.contains_key(&key(&environment, &tenant)) {
                    self.start(&environment, &tenant, shutdown);
                }
            }
            TenantEvent::Removed { environment, tenant } => {
                if let Some(token) = self.monitors.remove(&key(&environment, &tenant)) {
                    info!(%environment, %tenant, "stopping tenant monitor");
                    token.cancel();
                }
            }
        }
    }

    fn start(&mut self, environment: &str, tenant: &str, shutdown: &CancellationToken) {
        let key = key(environment, tenant);
        if self.monitors.contains_key(&key) {
            debug!(%environment, %tenant, "tenant already monitored");
            return;
        }

        info!(%environment, %tenant, "starting tenant monitor");
        let token = shutdown.child_token();
        let monitor = TenantMonitor::new(
            environment,
            tenant,
            self.settings.api.clone(),
            self.settings.scheduler.clone(),
            (self.settings.evaluators)(),
            self.settings.interval,
            self.settings.smoothing_tolerance,
        );

        let task_key = key.clone();
        let task_token = token.clone();
        self.tasks
            .spawn(async move { (task_key, monitor.run(task_token).await) });
        self.monitors.insert(key, token);
    }
}
