//! Recording reported status and reading aggregated health back

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::HubError;
use super::hierarchy::ServiceHierarchySource;
use crate::aggregation::{ServiceHealthData, StatusRollup, aggregate, aggregate_roots, combine};
use crate::model::{HealthStatus, ServiceHealthReport, ServiceNode, TenantConfiguration, fold_name};
use crate::storage::StatusCache;
use crate::timeseries::{CheckSamples, MetricLine, MetricWriter, Series, TimeSeriesClient, TimeSeriesResult};

pub const SERVICE_STATUS_METRIC: &str = "canopy_service_status";
pub const CHECK_STATUS_METRIC: &str = "canopy_health_check_status";
pub const CHECK_DATA_METRIC: &str = "canopy_health_check_data";

/// Where the statuses behind a health read came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusSource {
    TimeSeries,
    Cache,
}

/// Aggregated health of one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantHealth {
    pub environment: String,
    pub tenant: String,
    pub status: Option<HealthStatus>,
    pub timestamp: Option<DateTime<Utc>>,
    pub source: StatusSource,
    pub services: Vec<ServiceHealthData>,
}

/// Aggregated health of every tenant in an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentHealth {
    pub environment: String,
    pub status: Option<HealthStatus>,
    pub timestamp: Option<DateTime<Utc>>,
    pub tenants: Vec<TenantHealth>,
}

/// Status recording and health reads for the hub.
pub struct HealthDataService {
    writer: Arc<dyn MetricWriter>,
    query: Option<TimeSeriesClient>,
    cache: Arc<dyn StatusCache>,
    hierarchy: Arc<dyn ServiceHierarchySource>,
    lookback: Duration,
}

impl HealthDataService {
    pub fn new(
        writer: Arc<dyn MetricWriter>,
        cache: Arc<dyn StatusCache>,
        hierarchy: Arc<dyn ServiceHierarchySource>,
    ) -> Self {
        Self {
            writer,
            query: None,
            cache,
            hierarchy,
            lookback: Duration::from_secs(600),
        }
    }

    /// Read statuses back from a Prometheus-compatible backend.
    ///
    /// Without one, reads are always served from the status cache.
    pub fn with_query_client(mut self, client: TimeSeriesClient) -> Self {
        self.query = Some(client);
        self
    }

    /// How far back a health read looks for the latest report.
    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn hierarchy(&self) -> &Arc<dyn ServiceHierarchySource> {
        &self.hierarchy
    }

    async fn tenant_configuration(&self, environment: &str, tenant: &str) -> Result<TenantConfiguration, HubError> {
        self.hierarchy
            .tenant(environment, tenant)
            .await
            .ok_or_else(|| HubError::NotFound(format!("tenant {environment}/{tenant}")))
    }

    /// Refresh the fallback cache and write a service report as status metrics.
    ///
    /// The cache is refreshed even when the metric write fails, so reads keep
    /// falling back to current data while the time-series backend is down.
    #[instrument(skip(self, report), fields(status = %report.aggregate_status))]
    pub async fn record_status(
        &self,
        environment: &str,
        tenant: &str,
        service: &str,
        report: ServiceHealthReport,
    ) -> Result<(), HubError> {
        self.tenant_configuration(environment, tenant).await?;

        let lines = status_lines(environment, tenant, service, &report);

        let cache = self.cache.clone();
        let (env, ten, svc) = (environment.to_string(), tenant.to_string(), service.to_string());
        tokio::spawn(async move {
            if let Err(e) = cache.upsert_status(&env, &ten, &svc, &report).await {
                warn!(environment = %env, tenant = %ten, service = %svc, "failed to update status cache: {e}");
            }
        });

        self.writer.write(lines).await?;
        Ok(())
    }

    /// Write raw check samples uploaded by an agent.
    #[instrument(skip(self, samples))]
    pub async fn record_check_samples(
        &self,
        environment: &str,
        tenant: &str,
        service: &str,
        samples: CheckSamples,
    ) -> Result<usize, HubError> {
        self.tenant_configuration(environment, tenant).await?;

        let lines: Vec<MetricLine> = samples
            .into_iter()
            .flat_map(move |(check, samples)| {
                samples.into_iter().map(move |sample| {
                    MetricLine::new(CHECK_DATA_METRIC, sample.value, sample.timestamp)
                        .label("environment", environment)
                        .label("tenant", tenant)
                        .label("service", service)
                        .label("check", check.clone())
                })
            })
            .collect();

        let count = lines.len();
        self.writer.write(lines).await?;
        debug!("recorded {count} samples");
        Ok(count)
    }

    /// Aggregated health of one tenant.
    ///
    /// Statuses come from the time-series backend; when that fails or is not
    /// configured the status cache answers instead.
    #[instrument(skip(self))]
    pub async fn service_health(&self, environment: &str, tenant: &str) -> Result<TenantHealth, HubError> {
        let configuration = self.tenant_configuration(environment, tenant).await?;
        let roots = configuration.build_tree()?;

        let (records, source) = match self.query_reports(environment, tenant).await {
            Some(Ok(records)) => (records, StatusSource::TimeSeries),
            Some(Err(e)) => {
                warn!("status query failed, using cached statuses: {e}");
                (self.cache.latest_statuses(environment, tenant).await?, StatusSource::Cache)
            }
            None => (self.cache.latest_statuses(environment, tenant).await?, StatusSource::Cache),
        };

        let lookup = |node: &ServiceNode| records.get(&fold_name(&node.name)).cloned();
        let services: Vec<ServiceHealthData> = roots.iter().map(|root| aggregate(root, &lookup)).collect();
        let rollup = aggregate_roots(&services);

        Ok(TenantHealth {
            environment: environment.to_string(),
            tenant: tenant.to_string(),
            status: rollup.status,
            timestamp: rollup.timestamp,
            source,
            services,
        })
    }

    /// Aggregated health of every tenant in an environment.
    #[instrument(skip(self))]
    pub async fn environment_health(&self, environment: &str) -> Result<EnvironmentHealth, HubError> {
        let tenants = self.hierarchy.tenants(environment).await;
        if tenants.is_empty() {
            return Err(HubError::NotFound(format!("environment {environment}")));
        }

        let mut results = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            results.push(self.service_health(environment, &tenant).await?);
        }

        let rollup = combine(results.iter().map(|tenant| StatusRollup {
            status: tenant.status,
            timestamp: tenant.timestamp,
        }));

        Ok(EnvironmentHealth {
            environment: environment.to_string(),
            status: rollup.status,
            timestamp: rollup.timestamp,
            tenants: results,
        })
    }

    async fn query_reports(
        &self,
        environment: &str,
        tenant: &str,
    ) -> Option<TimeSeriesResult<HashMap<String, ServiceHealthReport>>> {
        let client = self.query.as_ref()?;
        Some(fetch_reports(client, environment, tenant, self.lookback).await)
    }
}

async fn fetch_reports(
    client: &TimeSeriesClient,
    environment: &str,
    tenant: &str,
    lookback: Duration,
) -> TimeSeriesResult<HashMap<String, ServiceHealthReport>> {
    let selector = format!(
        "{{environment=\"{}\",tenant=\"{}\"}}[{}s]",
        escape_selector(environment),
        escape_selector(tenant),
        lookback.as_secs().max(1)
    );
    let now = Utc::now();

    let services = client
        .query(&format!("{SERVICE_STATUS_METRIC}{selector}"), now)
        .await?;
    let checks = client
        .query(&format!("{CHECK_STATUS_METRIC}{selector}"), now)
        .await?;

    Ok(latest_reports(&services, &checks))
}

fn escape_selector(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// One-hot status lines for a report: `1` for the reported status, `0` for the rest.
fn status_lines(environment: &str, tenant: &str, service: &str, report: &ServiceHealthReport) -> Vec<MetricLine> {
    let one_hot = |name: &str, active: HealthStatus, check: Option<&str>| -> Vec<MetricLine> {
        HealthStatus::ALL
            .into_iter()
            .map(|status| {
                let value = if status == active { 1.0 } else { 0.0 };
                let line = MetricLine::new(name, value, report.timestamp)
                    .label("environment", environment)
                    .label("tenant", tenant)
                    .label("service", service)
                    .label("status", status.as_str());
                match check {
                    Some(check) => line.label("check", check),
                    None => line,
                }
            })
            .collect()
    };

    let mut lines = one_hot(SERVICE_STATUS_METRIC, report.aggregate_status, None);
    for (check, status) in &report.health_checks {
        lines.extend(one_hot(CHECK_STATUS_METRIC, *status, Some(check)));
    }
    lines
}

/// Latest active status per label combination.
fn latest_active<'a>(series: &'a [Series], key: impl Fn(&'a Series) -> Option<(String, HealthStatus)>) -> HashMap<String, (HealthStatus, DateTime<Utc>)> {
    let mut latest: HashMap<String, (HealthStatus, DateTime<Utc>)> = HashMap::new();

    for s in series {
        let Some((name, status)) = key(s) else { continue };
        let Some(last) = s.samples.last() else { continue };
        if last.value != 1.0 {
            continue;
        }

        let newer = latest
            .get(&name)
            .is_none_or(|(_, timestamp)| last.timestamp > *timestamp);
        if newer {
            latest.insert(name, (status, last.timestamp));
        }
    }

    latest
}

/// Rebuild per-service reports from status series.
fn latest_reports(services: &[Series], checks: &[Series]) -> HashMap<String, ServiceHealthReport> {
    let label_status = |s: &Series| s.labels.get("status").and_then(|v| HealthStatus::parse(v));

    let service_status = latest_active(services, |s| {
        Some((fold_name(s.labels.get("service")?), label_status(s)?))
    });
    // check key is "service\0check"
    let check_status = latest_active(checks, |s| {
        let service = fold_name(s.labels.get("service")?);
        let check = s.labels.get("check")?;
        Some((format!("{service}\0{check}"), label_status(s)?))
    });

    let mut reports: HashMap<String, ServiceHealthReport> = service_status
        .into_iter()
        .map(|(service, (status, timestamp))| {
            (
                service,
                ServiceHealthReport {
                    timestamp,
                    aggregate_status: status,
                    health_checks: Default::default(),
                },
            )
        })
        .collect();

    for (key, (status, _)) in check_status {
        if let Some((service, check)) = key.split_once('\0')
            && let Some(report) = reports.get_mut(service)
        {
            report.health_checks.insert(check.to_string(), status);
        }
    }

    reports
}
