//! Ingestion orchestrator
//!
//! Drives one run: the catalog stream is consumed in a single feed loop that
//! hands each raw feature to a bounded pool of workers, which normalize and
//! persist it. Missing reference tables are imported alongside. Writes are idempotent, so
//! workers commit in any order and a fatal error only has to stop the feed.

use crate::errors::IngestionError;
use crate::summary::{CoverageReport, RunSummary};
use futures::StreamExt;
use geo::Polygon;
use satlas_common::domain::FeatureBundle;
use satlas_common::errors::{AppError, Result};
use satlas_common::features;
use satlas_common::metrics;
use satlas_common::reference::{self, ImportReport, ReferenceClient};
use satlas_common::{CatalogClient, SearchRequest, SpatialRelationshipResolver, SpatialStore, UpsertOutcome};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

/// Run lifecycle; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Idle,
    Fetching,
    Normalizing,
    Persisting,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

/// Write outcomes for one feature
#[derive(Debug)]
struct PersistedFeature {
    satellite: UpsertOutcome,
    item_type: UpsertOutcome,
    asset_types: Vec<UpsertOutcome>,
    links: Vec<UpsertOutcome>,
    image: UpsertOutcome,
    footprint: Polygon<f64>,
}

type WorkerOutput = (Option<String>, Result<PersistedFeature>);

/// Accumulated state of the feed loop
#[derive(Default)]
struct Progress {
    summary: RunSummary,
    footprints: Vec<Polygon<f64>>,
    fatal: Option<AppError>,
}

impl Progress {
    fn record(&mut self, persisted: PersistedFeature) {
        self.summary.satellites.record(persisted.satellite);
        self.summary.item_types.record(persisted.item_type);
        for outcome in persisted.asset_types {
            self.summary.asset_types.record(outcome);
        }
        for outcome in persisted.links {
            self.summary.items_assets.record(outcome);
        }
        self.summary.images.record(persisted.image);
        self.footprints.push(persisted.footprint);
    }

    /// Drop one feature, or stop the run if the error is not feature-scoped
    fn skip(&mut self, feature_id: Option<&str>, err: AppError) {
        if !err.is_per_feature() {
            self.fail(err);
            return;
        }
        let reason = err.reason_label();
        warn!(
            feature_id = feature_id.unwrap_or("<unknown>"),
            reason,
            error = %err,
            "Skipping feature"
        );
        metrics::record_rejection(reason);
        self.summary.reject(reason);
    }

    /// Keep the first fatal error; later ones are only logged
    fn fail(&mut self, err: AppError) {
        if self.fatal.is_some() {
            warn!(error = %err, "Further error while stopping");
            return;
        }
        error!(error = %err, code = ?err.code(), "Fatal error, stopping feed");
        self.fatal = Some(err);
    }

    fn absorb(&mut self, joined: std::result::Result<WorkerOutput, JoinError>) {
        match joined {
            Ok((_, Ok(persisted))) => self.record(persisted),
            Ok((feature_id, Err(err))) => self.skip(feature_id.as_deref(), err),
            Err(err) => self.fail(AppError::Internal {
                message: format!("feature worker failed: {err}"),
            }),
        }
    }
}

pub struct IngestionOrchestrator {
    catalog: CatalogClient,
    store: Arc<dyn SpatialStore>,
    reference: Option<ReferenceClient>,
    workers: usize,
    state: watch::Sender<RunState>,
}

impl IngestionOrchestrator {
    pub fn new(catalog: CatalogClient, store: Arc<dyn SpatialStore>, workers: usize) -> Self {
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            catalog,
            store,
            reference: None,
            workers: workers.max(1),
            state,
        }
    }

    /// Import empty reference tables concurrently with each run
    pub fn with_reference(mut self, client: ReferenceClient) -> Self {
        self.reference = Some(client);
        self
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    fn advance(&self, next: RunState) {
        let moved = self.state.send_if_modified(|current| {
            if current.is_terminal() || *current >= next {
                return false;
            }
            *current = next;
            true
        });
        if moved {
            info!(state = ?next, "Run state changed");
        }
    }

    /// Execute one ingestion run to completion
    #[instrument(skip_all, fields(start = %request.start_date, end = %request.end_date, workers = self.workers))]
    pub async fn run(&self, request: SearchRequest) -> std::result::Result<RunSummary, IngestionError> {
        self.advance(RunState::Fetching);

        let (progress, reference) = tokio::join!(self.ingest(request), self.import_reference());
        let Progress {
            mut summary,
            footprints,
            fatal,
        } = progress;
        summary.reference = reference;

        if let Some(err) = fatal {
            self.advance(RunState::Failed);
            return Err(IngestionError::aborted(summary, err));
        }

        summary.coverage = self.coverage(&footprints).await;
        self.advance(RunState::Done);
        info!(
            fetched = summary.fetched,
            persisted = summary.persisted(),
            images_inserted = summary.images.inserted,
            images_skipped = summary.images.skipped,
            rejected = summary.rejected_total(),
            "Ingestion run finished"
        );
        Ok(summary)
    }

    async fn ingest(&self, request: SearchRequest) -> Progress {
        let mut progress = Progress::default();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<WorkerOutput> = JoinSet::new();
        let mut stream = self.catalog.search_features(request);

        while progress.fatal.is_none() {
            while let Some(joined) = tasks.try_join_next() {
                progress.absorb(joined);
            }
            if progress.fatal.is_some() {
                break;
            }

            let raw = match stream.next().await {
                Some(Ok(raw)) => raw,
                Some(Err(err)) => {
                    progress.fail(err);
                    break;
                }
                None => break,
            };
            progress.summary.fetched += 1;
            self.advance(RunState::Normalizing);

            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    progress.fail(AppError::Internal {
                        message: "worker pool closed".to_string(),
                    });
                    break;
                }
            };
            self.advance(RunState::Persisting);

            let store = Arc::clone(&self.store);
            tasks.spawn(async move {
                let _permit = permit;
                let feature_id = raw.id().map(str::to_string);
                let result = match features::from_raw(&raw) {
                    Ok(bundle) => persist(store.as_ref(), bundle).await,
                    Err(err) => Err(err),
                };
                (feature_id, result)
            });
        }

        if !tasks.is_empty() {
            debug!(in_flight = tasks.len(), "Waiting for in-flight features");
        }
        while let Some(joined) = tasks.join_next().await {
            progress.absorb(joined);
        }
        progress
    }

    async fn import_reference(&self) -> Option<ImportReport> {
        let client = self.reference.as_ref()?;
        match reference::import_missing(client, self.store.as_ref()).await {
            Ok(report) => Some(report),
            Err(err) => {
                warn!(error = %err, "Reference import failed, continuing without it");
                None
            }
        }
    }

    async fn coverage(&self, footprints: &[Polygon<f64>]) -> Option<CoverageReport> {
        if footprints.is_empty() {
            return None;
        }
        let resolver = match SpatialRelationshipResolver::load(self.store.as_ref()).await {
            Ok(resolver) => resolver,
            Err(err) => {
                warn!(error = %err, "Could not load reference index");
                return None;
            }
        };
        if resolver.is_empty() {
            return None;
        }

        let mut report = CoverageReport::default();
        for footprint in footprints {
            report.add(&resolver.resolve(footprint));
        }
        Some(report)
    }
}

/// Write one feature's entities, parents before children
async fn persist(store: &dyn SpatialStore, bundle: FeatureBundle) -> Result<PersistedFeature> {
    let satellite = store.upsert_satellite(&bundle.satellite).await?;
    metrics::record_write("satellites", satellite.is_inserted());

    let item_type = store.upsert_item_type(&bundle.item_type).await?;
    metrics::record_write("item_types", item_type.is_inserted());

    let mut asset_types = Vec::with_capacity(bundle.asset_types.len());
    let mut links = Vec::with_capacity(bundle.asset_types.len());
    for asset_type in &bundle.asset_types {
        let outcome = store.upsert_asset_type(asset_type).await?;
        metrics::record_write("asset_types", outcome.is_inserted());
        asset_types.push(outcome);

        let link = store.link_item_asset(&bundle.item_type.id, &asset_type.id).await?;
        metrics::record_write("items_assets", link.is_inserted());
        links.push(link);
    }

    let image = store.upsert_image_feature(&bundle.image).await?;
    metrics::record_write("sat_images", image.is_inserted());
    debug!(feature_id = %bundle.image.id, outcome = ?image, "Feature persisted");

    Ok(PersistedFeature {
        satellite,
        item_type,
        asset_types,
        links,
        image,
        footprint: bundle.image.footprint.polygon,
    })
}
