use std::sync::Arc;

use anyhow::Context;
use canopy::{
    agent::{
        AgentSupervisor, HttpStatusApiClient, MonitorSettings, StatusApi, TenantEvent,
        evaluator_factory,
    },
    config::{AgentConfig, read_config_file},
    scheduler::HealthCheckScheduler,
    util::get_token,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace};
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
        ("canopy_agent", LevelFilter::TRACE),
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

    let config: AgentConfig = read_config_file(&args.file)?;
    let token = get_token().or_else(|| config.token.clone());

    let api: Arc<dyn StatusApi> = Arc::new(
        HttpStatusApiClient::new(&config.hub_url, config.request_timeout(), token)
            .context("failed to build status API client")?,
    );
    let evaluators = evaluator_factory(&config, api.clone())?;

    let shutdown = CancellationToken::new();
    let scheduler = HealthCheckScheduler::new(config.max_concurrency);

    let (supervisor, events) = AgentSupervisor::new(MonitorSettings {
        api,
        scheduler: scheduler.handle(),
        evaluators,
        interval: config.interval(),
        smoothing_tolerance: config.smoothing_tolerance,
    });

    for tenant in &config.tenants {
        events
            .send(TenantEvent::Created {
                environment: config.environment.clone(),
                tenant: tenant.clone(),
            })
            .await
            .context("agent supervisor stopped before startup finished")?;
    }

    let scheduler_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.run(shutdown.clone()).await
                && !shutdown.is_cancelled()
            {
                error!("scheduler stopped: {e}");
                shutdown.cancel();
            }
        })
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received ctrl-c, shutting down");
            }
            shutdown.cancel();
        });
    }

    info!(
        "monitoring {} tenants in {} with {} concurrent checks",
        config.tenants.len(),
        config.environment,
        config.max_concurrency
    );
    supervisor.run(shutdown.clone()).await;
    drop(events);

    shutdown.cancel();
    scheduler_task.await?;

    Ok(())
}
