use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use risk_engine::config;
use risk_engine::enrichment::{CachedGeocoder, HttpGeocodingProvider};
use risk_engine::pipeline::SessionOrchestrator;
use risk_engine::profile::postgres::PostgresDocumentStore;
use risk_engine::profile::store::{DocumentStore, InMemoryDocumentStore, PROFILES_COLLECTION};
use risk_engine::telemetry::SessionTelemetry;
use risk_engine::utils;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score a session telemetry file and print the calculated record
    Process {
        /// Path to a SessionTelemetry JSON file
        file: PathBuf,
    },

    /// Print a user's stored behavioral profile
    InspectProfile {
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    utils::logging::init_logger();

    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = config::load_config()?;

    // Initialize metrics
    utils::metrics::init_metrics(&config)?;

    let store = build_store(&config).await?;

    match cli.command {
        Command::Process { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read telemetry file {}", file.display()))?;
            let session: SessionTelemetry =
                serde_json::from_str(&raw).context("Failed to parse session telemetry")?;

            let geocoder = Arc::new(CachedGeocoder::new(
                Arc::new(HttpGeocodingProvider::new(
                    &config.geocoding.base_url,
                    config.geocoding.timeout(),
                )?),
                config.geocoding.cache_size,
                config.geocoding.cache_ttl(),
            ));

            let orchestrator = SessionOrchestrator::new(geocoder, store, &config);
            let record = orchestrator.process_session(session).await?;

            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Command::InspectProfile { user_id } => {
            match store.get(PROFILES_COLLECTION, &user_id).await? {
                Some(doc) => println!("{}", serde_json::to_string_pretty(&doc.body)?),
                None => println!("No behavioral profile stored for user {}", user_id),
            }
        }
    }

    Ok(())
}

async fn build_store(config: &config::Settings) -> Result<Arc<dyn DocumentStore>> {
    match &config.database {
        Some(db) => {
            let store = PostgresDocumentStore::connect(db).await?;
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory document store");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
    }
}
