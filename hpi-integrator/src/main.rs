//! hpi-integrator - Hospital performance data integration
//!
//! Loads configuration, builds one collector per enabled source, integrates
//! every hospital from the hospitals file, and prints the batch result as JSON.
//!
//! Sources with a configured `base_url` are fetched over HTTP; all others are
//! served from the records embedded in the hospitals file.

use anyhow::{Context, Result};
use clap::Parser;
use hpi_common::config::load_resolved;
use hpi_common::events::EventBus;
use hpi_common::logging::init_tracing;
use hpi_integrator::collectors::{load_fixtures, CollectorRegistry};
use hpi_integrator::{IntegrationOrchestrator, PlanStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "hpi-integrator")]
#[command(about = "Collect, validate and consolidate hospital performance data")]
#[command(version)]
struct Args {
    /// Configuration file (overrides HPI_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hospitals file (JSON array of hospital descriptors with source records)
    #[arg(long, env = "HPI_HOSPITALS")]
    hospitals: PathBuf,

    /// Write a plan-store snapshot here after the batch
    #[arg(long)]
    plan_store: Option<PathBuf>,

    /// Override the configured batch pool size
    #[arg(long)]
    max_concurrent_plans: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_resolved(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(pool) = args.max_concurrent_plans {
        config.orchestrator.max_concurrent_plans = pool;
        config.validate().context("Invalid --max-concurrent-plans")?;
    }
    init_tracing(&config.logging)?;

    info!("Starting hpi-integrator");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let fixtures = load_fixtures(&args.hospitals)
        .with_context(|| format!("Failed to load hospitals from {}", args.hospitals.display()))?;
    let collectors = CollectorRegistry::from_config(&config.collectors, &fixtures)
        .context("Failed to build collectors")?;
    info!(collectors = collectors.len(), hospitals = fixtures.len(), "Collectors ready");

    let store = Arc::new(match &args.plan_store {
        Some(path) if path.exists() => PlanStore::load_snapshot(path)
            .await
            .with_context(|| format!("Failed to load plan snapshot {}", path.display()))?,
        _ => PlanStore::new(),
    });

    let event_bus = EventBus::new(config.orchestrator.event_capacity);
    let orchestrator = IntegrationOrchestrator::from_config(&config, collectors, Arc::clone(&store))?
        .with_event_bus(event_bus);

    let hospitals = fixtures.into_iter().map(|f| f.hospital).collect();
    let result = orchestrator.batch_hospital_integration(hospitals).await;

    let summary = orchestrator.cleanup_expired_plans().await;
    if !summary.archived.is_empty() || !summary.purged.is_empty() {
        info!(
            archived = summary.archived.len(),
            purged = summary.purged.len(),
            "Cleaned up expired plans"
        );
    }

    if let Some(path) = &args.plan_store {
        store
            .save_snapshot(path)
            .await
            .with_context(|| format!("Failed to write plan snapshot {}", path.display()))?;
    }

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.failed > 0 {
        warn!(failed = result.failed, "Some hospitals could not be integrated");
    }
    Ok(())
}
