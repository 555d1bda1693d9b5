//! Area-of-interest loading

use geojson::{GeoJson, Geometry};
use satlas_common::errors::{AppError, Result};
use std::path::Path;

/// Geometry of the first feature in a GeoJSON FeatureCollection file
pub fn load(path: &Path) -> Result<Geometry> {
    let text = std::fs::read_to_string(path).map_err(|e| invalid(path, e.to_string()))?;
    parse(&text).map_err(|message| invalid(path, message))
}

fn parse(text: &str) -> std::result::Result<Geometry, String> {
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| e.to_string())?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err("expected a FeatureCollection".to_string());
    };

    collection
        .features
        .into_iter()
        .next()
        .ok_or_else(|| "feature collection is empty".to_string())?
        .geometry
        .ok_or_else(|| "first feature has no geometry".to_string())
}

fn invalid(path: &Path, message: String) -> AppError {
    AppError::InvalidAoi {
        path: path.display().to_string(),
        message,
    }
}
