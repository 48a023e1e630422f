//! Drip: multi-step email sequence engine.
//!
//! Main entry point: loads config and the sequence catalog, wires the engine,
//! starts the periodic dispatcher, and serves HTTP.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use drip_api::ApiServer;
use drip_core::config::AppConfig;
use drip_core::SequenceCatalog;
use drip_engine::SequenceEngine;
use drip_store::MemoryStore;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "drip-server")]
#[command(about = "Multi-step email sequence engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "DRIP__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "DRIP__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Seconds between dispatch passes (overrides config)
    #[arg(long, env = "DRIP__SCHEDULER__INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// JSON sequence catalog (overrides config; built-in sequences otherwise)
    #[arg(long, env = "DRIP__CATALOG__PATH")]
    catalog: Option<String>,

    /// Serve HTTP only; dispatch runs only via POST /v1/dispatch
    #[arg(long, default_value_t = false)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drip_server=info,drip_engine=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Drip starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(secs) = cli.interval_secs {
        config.scheduler.interval_secs = secs;
    }
    if cli.catalog.is_some() {
        config.catalog.path = cli.catalog;
    }
    if cli.no_scheduler {
        config.scheduler.enabled = false;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        scheduler = config.scheduler.enabled,
        interval_secs = config.scheduler.interval_secs,
        transport = config.email.transport_configured(),
        "Configuration loaded"
    );

    // Sequence catalog; an invalid catalog is fatal.
    let catalog = match &config.catalog.path {
        Some(path) => SequenceCatalog::from_path(path)?,
        None => SequenceCatalog::builtin()?,
    };
    info!(
        sequences = catalog.len(),
        active = catalog.active().len(),
        "Sequence catalog ready"
    );

    let store = Arc::new(MemoryStore::new());
    let engine = SequenceEngine::from_config(&config, store, Arc::new(catalog))?;

    let api_server = ApiServer::new(config.clone(), engine.clone());

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    // Periodic dispatch trigger
    if config.scheduler.enabled {
        let period = Duration::from_secs(config.scheduler.interval_secs.max(1));
        let dispatcher = engine.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match dispatcher.process_due_sends().await {
                    Ok(summary) if summary.skipped => {
                        warn!("Previous dispatch pass still running, tick skipped")
                    }
                    Ok(summary) => info!(
                        processed = summary.processed,
                        sent = summary.sent,
                        errors = summary.errors,
                        "Scheduled dispatch complete"
                    ),
                    Err(e) => error!(error = %e, "Scheduled dispatch failed"),
                }
            }
        });
        info!(every_secs = period.as_secs(), "Dispatch scheduler started");
    } else {
        info!("Scheduler disabled, dispatch only via POST /v1/dispatch");
    }

    // Webhook rate-limit maintenance
    let limiter = api_server.state().limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.prune(chrono::Utc::now());
        }
    });

    info!("Drip is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
