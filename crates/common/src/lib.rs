//! Satlas Common Library
//!
//! Shared code for the Satlas ingestion pipeline including:
//! - Imagery catalog client with rate-limit backoff
//! - Footprint geometry normalization and equal-area derivations
//! - Raw feature to domain entity mapping
//! - Spatial relationship resolution over reference data
//! - Store contract, PostGIS repository, and in-memory store
//! - Error types, configuration, and metrics

pub mod catalog;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod features;
pub mod geometry;
pub mod metrics;
pub mod reference;
pub mod spatial;
pub mod store;

// Re-export commonly used types
pub use catalog::{CatalogClient, SearchRequest};
pub use config::AppConfig;
pub use db::Repository;
pub use errors::{AppError, Result};
pub use spatial::SpatialRelationshipResolver;
pub use store::{MemoryStore, SpatialStore, UpsertOutcome};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
