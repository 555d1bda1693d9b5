//! Ingestion service error types

use crate::summary::RunSummary;
use satlas_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    /// Failure before any feature was fetched (arguments, AOI, store, credentials)
    #[error(transparent)]
    Setup(#[from] AppError),

    /// Fatal error mid-run; carries the counts reached before stopping
    #[error("Ingestion aborted after {fetched} fetched features: {source}")]
    Aborted {
        fetched: u64,
        summary: Box<RunSummary>,
        #[source]
        source: AppError,
    },
}

impl IngestionError {
    pub fn aborted(summary: RunSummary, source: AppError) -> Self {
        IngestionError::Aborted {
            fetched: summary.fetched,
            summary: Box::new(summary),
            source,
        }
    }

    /// Counts reached before an abort, if the run got that far
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            IngestionError::Aborted { summary, .. } => Some(summary),
            IngestionError::Setup(_) => None,
        }
    }

    /// The underlying library error
    pub fn app_error(&self) -> &AppError {
        match self {
            IngestionError::Setup(err) => err,
            IngestionError::Aborted { source, .. } => source,
        }
    }
}
