//! Domain entities produced by ingestion and reference imports
//!
//! These are plain in-memory values. Persistence maps them onto the store schema;
//! spatial relationships between them are resolved by the spatial resolver, never
//! held as fields here.

use crate::geometry::Footprint;
use chrono::{DateTime, Utc};
use geo::{Geometry, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Satellite {
    pub id: String,
    pub name: String,
    /// Meters per pixel
    pub pixel_res: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemType {
    pub id: String,
    pub sat_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetType {
    pub id: String,
}

/// One catalog image: footprint plus acquisition metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFeature {
    pub id: String,
    pub footprint: Footprint,
    /// Fraction in [0, 1]
    pub cloud_cover: f64,
    /// Percent in [0, 100]
    pub clear_confidence_percent: i32,
    pub time_acquired: DateTime<Utc>,
    pub sat_id: String,
    pub item_type_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub iso: String,
    pub name: String,
    pub geom: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub location: Point<f64>,
    /// Fixed-radius buffer used for "near city" matching
    pub buffer: Polygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LandCoverClass {
    pub id: i64,
    pub featureclass: String,
    pub geom: Geometry<f64>,
}

/// Everything one catalog feature contributes to the store
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBundle {
    pub satellite: Satellite,
    pub item_type: ItemType,
    pub asset_types: Vec<AssetType>,
    pub image: ImageFeature,
}
