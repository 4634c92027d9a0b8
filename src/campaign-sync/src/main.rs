//! Campaign Sync: keeps locally created ad campaigns in step with the
//! advertising platform.
//!
//! Starts the worker pool and sweep scheduler, optionally seeds demo
//! campaigns, and runs until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use campaign_core::config::{AppConfig, MetricsConfig};
use campaign_engine::{
    AdService, CampaignService, InMemoryCampaignRepository, NewCampaign, SimulatedAdService,
    SyncEngine,
};
use clap::Parser;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "campaign-sync")]
#[command(about = "Synchronizes ad campaigns with an external advertising platform")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "CAMPAIGN_SYNC__NODE_ID")]
    node_id: Option<String>,

    /// Number of sync workers (overrides config)
    #[arg(long, env = "CAMPAIGN_SYNC__DISPATCHER__WORKERS")]
    workers: Option<usize>,

    /// Seconds between reconciliation sweeps (overrides config)
    #[arg(long, env = "CAMPAIGN_SYNC__SWEEP__INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    /// Injected failure rate of the simulated platform (overrides config)
    #[arg(long, env = "CAMPAIGN_SYNC__ADS__ERROR_RATE")]
    error_rate: Option<f64>,

    /// Create a handful of demo campaigns at startup
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campaign_sync=info,campaign_engine=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Campaign Sync starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(workers) = cli.workers {
        config.dispatcher.workers = workers;
    }
    if let Some(secs) = cli.sweep_interval_secs {
        config.sweep.interval_secs = secs;
    }
    if let Some(rate) = cli.error_rate {
        config.ads.error_rate = rate;
    }
    config.validate()?;

    info!(
        node_id = %config.node_id,
        workers = config.dispatcher.workers,
        sweep_interval_secs = config.sweep.interval_secs,
        error_rate = config.ads.error_rate,
        "Configuration loaded"
    );

    if let Err(e) = start_metrics(&config.metrics) {
        error!(error = %e, "Failed to start metrics exporter");
    }

    let ads = Arc::new(SimulatedAdService::new(config.ads.clone()));
    if ads.health_check().await {
        info!("Ad platform reachable");
    } else {
        warn!("Ad platform health check failed, syncs will retry");
    }

    let repository = Arc::new(InMemoryCampaignRepository::new());
    let engine = SyncEngine::start(&config, repository, ads);

    if cli.seed_demo {
        seed_demo(&engine.service()).await;
    }

    info!("Campaign Sync is running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let service = engine.service();
    engine.shutdown().await;

    match service.stats().await {
        Ok(stats) => info!(total = stats.total, by_status = ?stats.by_status, "Final campaign status"),
        Err(e) => warn!(error = %e, "Could not collect final stats"),
    }

    Ok(())
}

fn start_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(config.host.parse()?, config.port))
        .install()?;
    info!(port = config.port, "Metrics exporter started");
    Ok(())
}

async fn seed_demo(service: &CampaignService) {
    let demo = [
        ("Back to School", Decimal::new(2500, 2), "pencils, backpacks"),
        ("Summer Sale", Decimal::new(10000, 2), "sunglasses, sandals, beach towels"),
        ("Holiday Gifts", Decimal::new(50000, 2), "toys, gift cards"),
    ];
    for (name, budget, keywords) in demo {
        match service
            .create_campaign(NewCampaign::with_keyword_list(name, budget, keywords))
            .await
        {
            Ok(record) => info!(campaign_id = %record.id, name, "Demo campaign created"),
            Err(e) => warn!(name, error = %e, "Demo campaign rejected"),
        }
    }
}
