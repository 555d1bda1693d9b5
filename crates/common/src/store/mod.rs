//! Store contract for ingested and reference entities
//!
//! Every write is idempotent by primary key: re-submitting a known key is a silent
//! no-op reported as [`UpsertOutcome::Skipped`], never an error and never an
//! overwrite. Workers may therefore commit in any order.

mod memory;

pub use memory::MemoryStore;

use crate::domain::{AssetType, City, Country, ImageFeature, ItemType, LandCoverClass, Satellite};
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What an idempotent write did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    /// Primary key already present; stored row left untouched
    Skipped,
}

impl UpsertOutcome {
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows == 0 {
            UpsertOutcome::Skipped
        } else {
            UpsertOutcome::Inserted
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted)
    }
}

/// Row count per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub satellites: u64,
    pub item_types: u64,
    pub asset_types: u64,
    pub items_assets: u64,
    pub sat_images: u64,
    pub countries: u64,
    pub cities: u64,
    pub land_cover_classes: u64,
}

/// Persistence for the ingestion pipeline and its reference data.
///
/// Parents must exist before children: satellites before item types and images,
/// item types and asset types before their links.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    async fn upsert_satellite(&self, satellite: &Satellite) -> Result<UpsertOutcome>;

    async fn upsert_item_type(&self, item_type: &ItemType) -> Result<UpsertOutcome>;

    async fn upsert_asset_type(&self, asset_type: &AssetType) -> Result<UpsertOutcome>;

    /// Record that an item type offers an asset type
    async fn link_item_asset(&self, item_type_id: &str, asset_type_id: &str) -> Result<UpsertOutcome>;

    async fn upsert_image_feature(&self, image: &ImageFeature) -> Result<UpsertOutcome>;

    async fn insert_country(&self, country: &Country) -> Result<UpsertOutcome>;

    async fn insert_city(&self, city: &City) -> Result<UpsertOutcome>;

    async fn insert_land_cover_class(&self, class: &LandCoverClass) -> Result<UpsertOutcome>;

    /// Snapshot of all countries, for building the spatial index
    async fn countries(&self) -> Result<Vec<Country>>;

    async fn cities(&self) -> Result<Vec<City>>;

    async fn land_cover_classes(&self) -> Result<Vec<LandCoverClass>>;

    async fn counts(&self) -> Result<TableCounts>;
}
