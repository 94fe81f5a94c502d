use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lodestone_common::Config;
use lodestone_curator::report::save_report;
use lodestone_curator::Curator;
use lodestone_store::{PgStore, RecordStore};

#[derive(Parser)]
#[command(name = "lodestone-curator", about = "Catalog deduplication and relation repair jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect and merge duplicate resources
    Dedup {
        /// Preview only: report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-link orphaned raw records, then verify bidirectional links
    Repair {
        /// Preview only: report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify bidirectional links without repairing anything
    Verify,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lodestone=info".parse()?))
        .init();

    let cli = Cli::parse();

    // Load config and connect
    let config = Config::from_env();
    let store = PgStore::connect(&config.database_url, config.pg_max_connections).await?;
    store.migrate().await?;

    let curator = Curator::new(Arc::new(store.clone()) as Arc<dyn RecordStore>);
    let run_stamp = Utc::now().format("%Y%m%dT%H%M%SZ");

    match cli.command {
        Command::Dedup { dry_run } => {
            info!(dry_run, "Starting deduplication run");
            let report = curator.run_deduplication(dry_run).await?;
            save_report(&format!("dedup-{run_stamp}"), &report)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Repair { dry_run } => {
            info!(dry_run, "Starting relation repair run");
            let stats = curator.run_relation_repair(dry_run).await?;
            save_report(&format!("repair-{run_stamp}"), &stats)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);

            let summary = curator.verify_bidirectional_links().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Verify => {
            let summary = curator.verify_bidirectional_links().await?;
            save_report(&format!("verify-{run_stamp}"), &summary)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    store.close().await;
    Ok(())
}
