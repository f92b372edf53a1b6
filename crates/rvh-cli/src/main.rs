use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rvh_sync::{sweep_once, HarvestConfig, HarvestContext, HarvestScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "rvh-cli")]
#[command(about = "Review harvester command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the global tick and per-entity refresh timers until Ctrl-C.
    Run,
    /// Scrape every enabled business once and exit.
    ScrapeOnce,
    /// Apply the database migrations for reviews and businesses.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = HarvestConfig::from_env();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let ctx = Arc::new(HarvestContext::from_config(&config).await?);
            HarvestScheduler::from_config(ctx, &config)
                .start()
                .run_until_ctrl_c()
                .await?;
        }
        Commands::ScrapeOnce => {
            let ctx = HarvestContext::from_config(&config).await?;
            let report = sweep_once(&ctx).await?;
            let reviews: usize = report.scraped.iter().map(|(_, n)| n).sum();
            println!(
                "sweep complete: scraped={} skipped={} failed={} reviews={}",
                report.scraped.len(),
                report.skipped.len(),
                report.failed.len(),
                reviews
            );
            for (entity_id, error) in &report.failed {
                eprintln!("  {entity_id}: {error}");
            }
        }
        Commands::Migrate => {
            let pool = rvh_storage::connect_pool(&config.database_url).await?;
            rvh_storage::run_migrations(&pool).await?;
            tracing::info!("migrations applied");
        }
    }

    Ok(())
}
