//! Static reference data import
//!
//! Countries, populated places, and land-cover classes come from the Natural Earth
//! GeoJSON mirror. A table is filled only when it is empty at run start; existing
//! rows are never updated.

use crate::config::ReferenceConfig;
use crate::domain::{City, Country, LandCoverClass};
use crate::errors::{AppError, Result};
use crate::geometry::{self, BUFFER_SEGMENTS};
use crate::metrics;
use crate::store::SpatialStore;
use geo::Geometry;
use geojson::{Feature, FeatureCollection, GeoJson};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

pub const COUNTRIES_DATASET: &str = "ne_50m_admin_0_countries.geojson";
pub const POPULATED_PLACES_DATASET: &str = "ne_50m_populated_places_simple.geojson";
pub const RIVERS_DATASET: &str = "ne_50m_rivers_lake_centerlines.geojson";
pub const URBAN_AREAS_DATASET: &str = "ne_50m_urban_areas.geojson";

/// Rows inserted per reference table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub countries: usize,
    pub cities: usize,
    pub land_cover_classes: usize,
}

/// Natural Earth GeoJSON client
pub struct ReferenceClient {
    http: reqwest::Client,
    base_url: String,
    city_buffer_m: f64,
}

impl ReferenceClient {
    pub fn new(config: &ReferenceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            city_buffer_m: config.city_buffer_m,
        })
    }

    #[instrument(skip(self))]
    async fn fetch(&self, dataset: &str) -> Result<FeatureCollection> {
        let url = format!("{}/{}", self.base_url, dataset);
        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if status.as_u16() >= 300 {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        match text.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(collection)) => Ok(collection),
            Ok(_) => Err(AppError::Internal {
                message: format!("{} is not a FeatureCollection", dataset),
            }),
            Err(e) => Err(AppError::Internal {
                message: format!("{} is not valid GeoJSON: {}", dataset, e),
            }),
        }
    }

    pub async fn countries(&self) -> Result<Vec<Country>> {
        Ok(parse_countries(&self.fetch(COUNTRIES_DATASET).await?))
    }

    pub async fn cities(&self) -> Result<Vec<City>> {
        Ok(parse_cities(
            &self.fetch(POPULATED_PLACES_DATASET).await?,
            self.city_buffer_m,
        ))
    }

    pub async fn land_cover_classes(&self) -> Result<Vec<LandCoverClass>> {
        let (rivers, urban_areas) = tokio::try_join!(
            self.fetch(RIVERS_DATASET),
            self.fetch(URBAN_AREAS_DATASET)
        )?;
        Ok(parse_land_cover(&[rivers, urban_areas]))
    }
}

/// Fill every reference table that is currently empty
#[instrument(skip_all)]
pub async fn import_missing(client: &ReferenceClient, store: &dyn SpatialStore) -> Result<ImportReport> {
    let counts = store.counts().await?;

    let countries = async {
        if counts.countries > 0 {
            return Ok(0);
        }
        let mut inserted = 0;
        for country in client.countries().await? {
            if store.insert_country(&country).await?.is_inserted() {
                inserted += 1;
            } else {
                warn!(iso = %country.iso, name = %country.name, "Duplicate country code, keeping the first");
            }
        }
        Ok::<_, AppError>(inserted)
    };

    let cities = async {
        if counts.cities > 0 {
            return Ok(0);
        }
        let mut inserted = 0;
        for city in client.cities().await? {
            if store.insert_city(&city).await?.is_inserted() {
                inserted += 1;
            } else {
                warn!(id = city.id, city = %city.name, "City already stored, skipped");
            }
        }
        Ok::<_, AppError>(inserted)
    };

    let land_cover_classes = async {
        if counts.land_cover_classes > 0 {
            return Ok(0);
        }
        let mut inserted = 0;
        for class in client.land_cover_classes().await? {
            if store.insert_land_cover_class(&class).await?.is_inserted() {
                inserted += 1;
            } else {
                warn!(id = class.id, featureclass = %class.featureclass, "Land-cover class already stored, skipped");
            }
        }
        Ok::<_, AppError>(inserted)
    };

    let (countries, cities, land_cover_classes) =
        tokio::try_join!(countries, cities, land_cover_classes)?;

    metrics::record_reference_import("countries", countries);
    metrics::record_reference_import("cities", cities);
    metrics::record_reference_import("land_cover_classes", land_cover_classes);

    let report = ImportReport {
        countries,
        cities,
        land_cover_classes,
    };
    info!(
        countries = report.countries,
        cities = report.cities,
        land_cover_classes = report.land_cover_classes,
        "Reference import finished"
    );
    Ok(report)
}

/// Countries keyed by ISO alpha-2; polygons are promoted to multi-polygons
pub fn parse_countries(collection: &FeatureCollection) -> Vec<Country> {
    collection
        .features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| {
            let Some(iso) = property_str(feature, "iso_a2") else {
                dropped(COUNTRIES_DATASET, index, "missing iso_a2");
                return None;
            };
            let Some(name) = property_str(feature, "name") else {
                dropped(COUNTRIES_DATASET, index, "missing name");
                return None;
            };
            let geom = match feature_geometry(feature) {
                Some(Geometry::MultiPolygon(multi)) => multi,
                Some(Geometry::Polygon(polygon)) => geometry::promote(polygon),
                Some(_) => {
                    dropped(COUNTRIES_DATASET, index, "boundary is not a polygon");
                    return None;
                }
                None => {
                    dropped(COUNTRIES_DATASET, index, "missing geometry");
                    return None;
                }
            };
            Some(Country { iso, name, geom })
        })
        .collect()
}

/// Cities keyed by their position in the dataset, each with its buffer polygon
pub fn parse_cities(collection: &FeatureCollection, buffer_m: f64) -> Vec<City> {
    collection
        .features
        .iter()
        .enumerate()
        .filter_map(|(index, feature)| {
            let Some(name) = property_str(feature, "name") else {
                dropped(POPULATED_PLACES_DATASET, index, "missing name");
                return None;
            };
            let Some(Geometry::Point(location)) = feature_geometry(feature) else {
                dropped(POPULATED_PLACES_DATASET, index, "missing point location");
                return None;
            };
            let buffer = match geometry::buffer_point(location, buffer_m, BUFFER_SEGMENTS) {
                Ok(buffer) => buffer,
                Err(e) => {
                    warn!(city = %name, error = %e, "Skipping city");
                    return None;
                }
            };
            Some(City {
                id: index as i64,
                name,
                location,
                buffer,
            })
        })
        .collect()
}

/// Land-cover classes from several datasets, numbered in order after dropping
/// features that lack a geometry or a class
pub fn parse_land_cover(collections: &[FeatureCollection]) -> Vec<LandCoverClass> {
    collections
        .iter()
        .flat_map(|collection| collection.features.iter().enumerate())
        .filter_map(|(index, feature)| {
            let Some(featureclass) = property_str(feature, "featureclass") else {
                dropped("land cover", index, "missing featureclass");
                return None;
            };
            let Some(geom) = feature_geometry(feature) else {
                dropped("land cover", index, "missing geometry");
                return None;
            };
            Some((featureclass, geom))
        })
        .enumerate()
        .map(|(index, (featureclass, geom))| LandCoverClass {
            id: index as i64,
            featureclass,
            geom,
        })
        .collect()
}

fn dropped(dataset: &str, index: usize, reason: &str) {
    warn!(dataset, index, reason, "Dropping reference feature");
}

/// String property, looked up as given and then upper-cased
fn property_str(feature: &Feature, key: &str) -> Option<String> {
    feature
        .property(key)
        .or_else(|| feature.property(key.to_uppercase()))
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn feature_geometry(feature: &Feature) -> Option<Geometry<f64>> {
    let geometry = feature.geometry.as_ref()?;
    Geometry::<f64>::try_from(geometry.value.clone()).ok()
}
