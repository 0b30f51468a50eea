//! Agent side: fetch tenant hierarchies, run checks, report status
//!
//! ```text
//! AgentSupervisor ──► TenantMonitor (one per tenant, own evaluator chain)
//!                        │ queue_health_check
//!                        ▼
//!                 HealthCheckScheduler ──► CheckEvaluator ──► HTTP / metric
//! ```

pub mod api;
pub mod monitor;
pub mod supervisor;

use std::sync::Arc;

use anyhow::Context;

use crate::checks::{CheckEvaluator, HealthCheckEvaluator, HttpCheckEvaluator, MetricCheckEvaluator};
use crate::config::{AgentConfig, MetricBackendConfig};
use crate::model::{HttpCheckDefinition, MetricCheckDefinition};
use crate::query::{BackendQueryRunner, CachingQueryRunner, MetricQueryRunner, ReportingQueryRunner};
use crate::scheduler::SharedEvaluator;
use crate::timeseries::{BackendKind, TimeSeriesClient};

pub use api::{ErrorLevel, ErrorReportDetails, HttpStatusApiClient, StatusApi, StatusApiError};
pub use monitor::{CycleOutcome, TenantMonitor};
pub use supervisor::{AgentSupervisor, EvaluatorFactory, MonitorSettings, TenantEvent};

/// Build the factory that gives each tenant monitor its own evaluator chain.
///
/// Clients are built once here and shared; the caching and reporting runners
/// are created per tenant. Metric checks go through reporting, then caching,
/// then the backend. A backend missing from the config leaves its checks
/// `Unknown`.
pub fn evaluator_factory(config: &AgentConfig, api: Arc<dyn StatusApi>) -> anyhow::Result<EvaluatorFactory> {
    let http: Arc<dyn HealthCheckEvaluator<HttpCheckDefinition>> = Arc::new(
        HttpCheckEvaluator::new(config.request_timeout()).context("failed to build HTTP check client")?,
    );
    let prometheus = config
        .prometheus
        .as_ref()
        .map(|backend| backend_runner(BackendKind::Prometheus, backend, config))
        .transpose()?;
    let loki = config
        .loki
        .as_ref()
        .map(|backend| backend_runner(BackendKind::Loki, backend, config))
        .transpose()?;

    let factory: EvaluatorFactory = Arc::new(move || {
        let mut evaluator = CheckEvaluator::new(http.clone());
        if let Some(backend) = &prometheus {
            evaluator = evaluator.with_prometheus(metric_evaluator(backend.clone(), api.clone()));
        }
        if let Some(backend) = &loki {
            evaluator = evaluator.with_loki(metric_evaluator(backend.clone(), api.clone()));
        }
        Arc::new(evaluator) as SharedEvaluator
    });
    Ok(factory)
}

fn backend_runner(
    kind: BackendKind,
    backend: &MetricBackendConfig,
    config: &AgentConfig,
) -> anyhow::Result<Arc<dyn MetricQueryRunner>> {
    let client = TimeSeriesClient::new(kind, &backend.url, config.request_timeout(), backend.token.clone())
        .with_context(|| format!("failed to build {kind:?} client"))?;

    Ok(Arc::new(BackendQueryRunner::new(client, backend.step())))
}

fn metric_evaluator(
    backend: Arc<dyn MetricQueryRunner>,
    api: Arc<dyn StatusApi>,
) -> Arc<dyn HealthCheckEvaluator<MetricCheckDefinition>> {
    let runner = Arc::new(CachingQueryRunner::new(backend));
    let runner = Arc::new(ReportingQueryRunner::new(runner, api));

    Arc::new(MetricCheckEvaluator::new(runner))
}
