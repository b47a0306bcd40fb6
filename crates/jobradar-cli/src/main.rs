use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobradar_store::{MemoryOfferStore, OfferStore};
use jobradar_sync::{maybe_build_scheduler, purge_expired, CollectPipeline, FixtureOfferSource, SyncConfig};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "jobradar")]
#[command(about = "Job offer collection and reconciliation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one collect cycle against the configured fixture source.
    Collect,
    /// Run the cron scheduler until interrupted.
    Schedule,
    /// Delete offers older than the retention window.
    Purge,
    /// Print store diagnostics.
    Stats,
}

fn build_pipeline(config: SyncConfig, store: Arc<dyn OfferStore>) -> CollectPipeline {
    let source = FixtureOfferSource::new(config.fixtures_dir.clone());
    CollectPipeline::new(config, Box::new(source), store)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();
    let store: Arc<dyn OfferStore> = Arc::new(MemoryOfferStore::new());

    match cli.command.unwrap_or(Commands::Collect) {
        Commands::Collect => {
            let pipeline = build_pipeline(config, store);
            let summary = pipeline.run_once().await?;
            println!(
                "collect complete: run_id={} queries={} scraped={} kept={} created={} updated={} errors={}",
                summary.run_id,
                summary.queries_run,
                summary.scraped,
                summary.kept_after_dedup,
                summary.created,
                summary.updated,
                summary.errors
            );
        }
        Commands::Schedule => {
            let mut config = config;
            config.scheduler_enabled = true;
            let pipeline = Arc::new(build_pipeline(config, store));
            let mut scheduler = maybe_build_scheduler(pipeline)
                .await?
                .context("scheduler was not built despite being enabled")?;
            scheduler.start().await.context("starting scheduler")?;
            info!("scheduler running, press ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
        }
        Commands::Purge => {
            let retention_days = config.retention_days;
            let deleted = purge_expired(store.as_ref(), retention_days).await?;
            println!("purge complete: deleted={deleted} retention_days={retention_days}");
        }
        Commands::Stats => {
            let stats = store.stats(7).await?;
            println!(
                "stats: total_offers={} recent_offers={}",
                stats.total_offers, stats.recent_offers
            );
        }
    }

    Ok(())
}
