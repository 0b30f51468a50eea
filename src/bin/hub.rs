use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use canopy::{
    api::{ApiConfig, ApiState, spawn_api_server},
    config::{HubConfig, StorageConfig, read_config_file},
    hub::{ErrorReportLog, HealthDataService, ServiceHierarchySource, StaticHierarchy},
    maintenance::{MaintenanceRecorder, MaintenanceStore},
    storage::{MemoryMaintenanceStore, MemoryStatusCache, StatusCache},
    timeseries::{BackendKind, HttpImportWriter, MemoryMetricWriter, MetricWriter, TimeSeriesClient},
    util::get_token,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("canopy", LevelFilter::DEBUG),
        ("canopy_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config: HubConfig = read_config_file(&args.file)?;
    let timeout = Duration::from_secs(config.request_timeout.max(1));

    let (maintenance, cache) = open_storage(&config.storage).await?;
    let hierarchy: Arc<dyn ServiceHierarchySource> =
        Arc::new(StaticHierarchy::new(config.environments.clone()));

    let (writer, query): (Arc<dyn MetricWriter>, Option<TimeSeriesClient>) = match &config.timeseries {
        Some(timeseries) => {
            let writer: Arc<dyn MetricWriter> = Arc::new(
                HttpImportWriter::new(&timeseries.import_url, timeout, timeseries.token.clone())
                    .context("failed to build metric writer")?,
            );
            let query = match &timeseries.query_url {
                Some(query_url) => Some(
                    TimeSeriesClient::new(BackendKind::Prometheus, query_url, timeout, timeseries.token.clone())
                        .context("failed to build time-series query client")?,
                ),
                None => None,
            };
            (writer, query)
        }
        None => {
            warn!("no time-series backend configured, status history is kept in memory only");
            let writer: Arc<dyn MetricWriter> = Arc::new(MemoryMetricWriter::new());
            (writer, None)
        }
    };

    let lookback = config
        .timeseries
        .as_ref()
        .map_or(Duration::from_secs(300), |timeseries| Duration::from_secs(timeseries.lookback.max(1)));
    let mut health =
        HealthDataService::new(writer.clone(), cache.clone(), hierarchy.clone()).with_lookback(lookback);
    if let Some(client) = query {
        health = health.with_query_client(client);
    }

    let shutdown = CancellationToken::new();

    let mut recorder = MaintenanceRecorder::new(
        maintenance.clone(),
        hierarchy,
        writer,
        Duration::from_secs(config.maintenance.interval.max(1)),
    );
    if let Some(stale_after) = config.maintenance.stale_after {
        recorder = recorder.with_stale_after(Duration::from_secs(stale_after));
    }
    let recorder_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { recorder.run(shutdown).await })
    };

    let state = ApiState::new(
        Arc::new(health),
        Arc::new(ErrorReportLog::new(config.error_report_capacity)),
        maintenance,
        cache,
    );
    let api_config = ApiConfig {
        bind_addr: SocketAddr::new(config.addr, config.port),
        auth_token: get_token().or_else(|| config.token.clone()),
        enable_cors: config.enable_cors,
    };
    if api_config.auth_token.is_none() {
        warn!("no API token configured, the hub API is unauthenticated");
    }
    let addr = spawn_api_server(api_config, state).await?;
    info!("hub listening on {addr}");

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");
    shutdown.cancel();
    recorder_task.await?;

    Ok(())
}

async fn open_storage(
    config: &StorageConfig,
) -> anyhow::Result<(Arc<dyn MaintenanceStore>, Arc<dyn StatusCache>)> {
    match config {
        StorageConfig::None => {
            warn!("storage backend is 'none', maintenance windows are lost on restart");
            let maintenance: Arc<dyn MaintenanceStore> = Arc::new(MemoryMaintenanceStore::new());
            let cache: Arc<dyn StatusCache> = Arc::new(MemoryStatusCache::new());
            Ok((maintenance, cache))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let store = Arc::new(
                canopy::storage::SqliteStore::new(path)
                    .await
                    .context("failed to open SQLite store")?,
            );
            let maintenance: Arc<dyn MaintenanceStore> = store.clone();
            let cache: Arc<dyn StatusCache> = store;
            Ok((maintenance, cache))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("SQLite storage requested but the storage-sqlite feature is disabled")
        }
    }
}
