//! Satlas Ingestion Service
//!
//! One run per invocation:
//! 1. Loads the AOI and builds the catalog search
//! 2. Streams matching features from the catalog
//! 3. Normalizes footprints and persists every entity idempotently
//! 4. Imports missing reference tables alongside
//! 5. Prints a per-entity summary

mod aoi;
mod args;
mod errors;
mod orchestrator;
mod summary;

use args::Args;
use chrono::Utc;
use clap::Parser;
use errors::IngestionError;
use orchestrator::IngestionOrchestrator;
use satlas_common::config::{AppConfig, ObservabilityConfig};
use satlas_common::reference::ReferenceClient;
use satlas_common::{metrics, CatalogClient, MemoryStore, Repository, SpatialStore, VERSION};
use std::sync::Arc;
use summary::RunSummary;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = AppConfig::load();

    let observability = config
        .as_ref()
        .map(|c| c.observability.clone())
        .unwrap_or_default();
    init_tracing(&observability);

    info!("Starting Satlas Ingestion v{}", VERSION);

    let config = config.map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    metrics::register_metrics();

    match run(args, config).await {
        Ok(summary) => {
            println!("{summary}");
            Ok(())
        }
        Err(err) => {
            if let Some(summary) = err.summary() {
                println!("{summary}");
            }
            error!(error = %err, code = ?err.app_error().code(), "Ingestion failed");
            Err(err.into())
        }
    }
}

/// Logs go to stderr so stdout carries only the summary
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

async fn run(args: Args, mut config: AppConfig) -> Result<RunSummary, IngestionError> {
    let aoi = aoi::load(&args.aoi_file)?;
    let request = args.search_request(aoi, Utc::now().date_naive())?;

    let api_key = config.catalog.resolve_api_key(args.api_key.as_deref());
    let catalog = CatalogClient::new(&config.catalog, api_key)?;

    if let Some(workers) = args.workers {
        config.ingestion.workers = workers;
    }

    if args.dry_run {
        info!("Dry run, using in-memory store");
        let store = Arc::new(MemoryStore::new());
        let orchestrator = build_orchestrator(catalog, store.clone(), &args, &config)?;
        let result = orchestrator.run(request).await;
        log_counts(store.as_ref()).await;
        return result;
    }

    info!("Connecting to database...");
    let repository = Arc::new(Repository::connect(&config.database).await?);
    repository.migrate().await?;

    let orchestrator = build_orchestrator(catalog, repository.clone(), &args, &config)?;
    let result = orchestrator.run(request).await;
    drop(orchestrator);

    log_counts(repository.as_ref()).await;
    match Arc::try_unwrap(repository) {
        Ok(repository) => {
            if let Err(e) = repository.close().await {
                warn!(error = %e, "Failed to close database connection");
            }
        }
        Err(_) => warn!("Repository still shared at shutdown, leaving pool open"),
    }
    result
}

fn build_orchestrator(
    catalog: CatalogClient,
    store: Arc<dyn SpatialStore>,
    args: &Args,
    config: &AppConfig,
) -> Result<IngestionOrchestrator, IngestionError> {
    let orchestrator = IngestionOrchestrator::new(catalog, store, config.ingestion.effective_workers());

    if args.skip_reference || !config.reference.enabled {
        info!("Reference import disabled");
        return Ok(orchestrator);
    }
    Ok(orchestrator.with_reference(ReferenceClient::new(&config.reference)?))
}

async fn log_counts(store: &dyn SpatialStore) {
    match store.counts().await {
        Ok(counts) => info!(
            satellites = counts.satellites,
            item_types = counts.item_types,
            asset_types = counts.asset_types,
            sat_images = counts.sat_images,
            countries = counts.countries,
            cities = counts.cities,
            land_cover_classes = counts.land_cover_classes,
            "Store row counts"
        ),
        Err(e) => warn!(error = %e, "Could not read store row counts"),
    }
}
