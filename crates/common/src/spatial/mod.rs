//! Spatial relationships between image footprints and reference geometries
//!
//! Relationships are never stored; they are resolved on demand. Each reference
//! table is held in an R-tree of bounding boxes; a query first prunes by envelope
//! and then runs an exact intersection test on the survivors.

use crate::domain::{City, Country, LandCoverClass};
use crate::errors::Result;
use crate::store::SpatialStore;
use geo::{BoundingRect, Geometry, Intersects, Polygon};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Reference geometry with its key and cached envelope
struct IndexedGeometry<K> {
    key: K,
    envelope: AABB<[f64; 2]>,
    geometry: Geometry<f64>,
}

impl<K> IndexedGeometry<K> {
    fn new(key: K, geometry: Geometry<f64>) -> Option<Self> {
        let rect = geometry.bounding_rect()?;
        let envelope = AABB::from_corners(
            [rect.min().x, rect.min().y],
            [rect.max().x, rect.max().y],
        );
        Some(Self {
            key,
            envelope,
            geometry,
        })
    }
}

impl<K> RTreeObject for IndexedGeometry<K> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Every reference match for one footprint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    pub countries: Vec<String>,
    pub cities: Vec<i64>,
    pub land_cover_classes: Vec<i64>,
}

/// Named spatial queries over the reference tables
pub struct SpatialRelationshipResolver {
    countries: RTree<IndexedGeometry<String>>,
    cities: RTree<IndexedGeometry<i64>>,
    land_cover_classes: RTree<IndexedGeometry<i64>>,
}

impl SpatialRelationshipResolver {
    /// Build the index from reference snapshots
    pub fn new(countries: &[Country], cities: &[City], classes: &[LandCoverClass]) -> Self {
        let countries = countries
            .iter()
            .filter_map(|c| IndexedGeometry::new(c.iso.clone(), Geometry::MultiPolygon(c.geom.clone())))
            .collect();
        // Cities are matched by their buffer, never by the raw point
        let cities = cities
            .iter()
            .filter_map(|c| IndexedGeometry::new(c.id, Geometry::Polygon(c.buffer.clone())))
            .collect();
        let classes = classes
            .iter()
            .filter_map(|c| IndexedGeometry::new(c.id, c.geom.clone()))
            .collect();

        Self {
            countries: RTree::bulk_load(countries),
            cities: RTree::bulk_load(cities),
            land_cover_classes: RTree::bulk_load(classes),
        }
    }

    /// Build the index from the store's current reference tables
    pub async fn load(store: &dyn SpatialStore) -> Result<Self> {
        let countries = store.countries().await?;
        let cities = store.cities().await?;
        let classes = store.land_cover_classes().await?;

        let resolver = Self::new(&countries, &cities, &classes);
        info!(
            countries = resolver.countries.size(),
            cities = resolver.cities.size(),
            land_cover_classes = resolver.land_cover_classes.size(),
            "Spatial index built"
        );
        Ok(resolver)
    }

    /// True when no reference geometry is indexed
    pub fn is_empty(&self) -> bool {
        self.countries.size() == 0 && self.cities.size() == 0 && self.land_cover_classes.size() == 0
    }

    /// ISO codes of every country the footprint intersects
    pub fn countries_intersecting(&self, footprint: &Polygon<f64>) -> Vec<String> {
        matches(&self.countries, footprint)
    }

    /// Ids of every city whose buffer the footprint intersects
    pub fn cities_within_buffer(&self, footprint: &Polygon<f64>) -> Vec<i64> {
        matches(&self.cities, footprint)
    }

    pub fn land_cover_classes_intersecting(&self, footprint: &Polygon<f64>) -> Vec<i64> {
        matches(&self.land_cover_classes, footprint)
    }

    pub fn resolve(&self, footprint: &Polygon<f64>) -> Coverage {
        Coverage {
            countries: self.countries_intersecting(footprint),
            cities: self.cities_within_buffer(footprint),
            land_cover_classes: self.land_cover_classes_intersecting(footprint),
        }
    }
}

fn matches<K: Clone + Ord>(tree: &RTree<IndexedGeometry<K>>, footprint: &Polygon<f64>) -> Vec<K> {
    let Some(rect) = footprint.bounding_rect() else {
        return Vec::new();
    };
    let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

    let mut keys: Vec<K> = tree
        .locate_in_envelope_intersecting(&envelope)
        .filter(|entry| entry.geometry.intersects(footprint))
        .map(|entry| entry.key.clone())
        .collect();
    keys.sort();
    keys.dedup();
    keys
}
