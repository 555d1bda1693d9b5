//! In-process store
//!
//! Same contract as the PostGIS repository, including foreign-key checks, kept in
//! hash maps behind a mutex. Backs dry runs and tests.

use super::{SpatialStore, TableCounts, UpsertOutcome};
use crate::domain::{AssetType, City, Country, ImageFeature, ItemType, LandCoverClass, Satellite};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::DbErr;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    satellites: HashMap<String, Satellite>,
    item_types: HashMap<String, ItemType>,
    asset_types: HashMap<String, AssetType>,
    items_assets: HashSet<(String, String)>,
    sat_images: HashMap<String, ImageFeature>,
    countries: BTreeMap<String, Country>,
    cities: BTreeMap<i64, City>,
    land_cover_classes: BTreeMap<i64, LandCoverClass>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| AppError::Internal {
            message: "memory store lock poisoned".to_string(),
        })
    }

    /// Stored image by external id
    pub fn image(&self, id: &str) -> Result<Option<ImageFeature>> {
        Ok(self.tables()?.sat_images.get(id).cloned())
    }

    /// Stored satellite by id
    pub fn satellite(&self, id: &str) -> Result<Option<Satellite>> {
        Ok(self.tables()?.satellites.get(id).cloned())
    }
}

fn insert_once<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, value: V) -> UpsertOutcome {
    match map.entry(key) {
        Entry::Occupied(_) => UpsertOutcome::Skipped,
        Entry::Vacant(slot) => {
            slot.insert(value);
            UpsertOutcome::Inserted
        }
    }
}

fn insert_once_ordered<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, value: V) -> UpsertOutcome {
    if map.contains_key(&key) {
        return UpsertOutcome::Skipped;
    }
    map.insert(key, value);
    UpsertOutcome::Inserted
}

fn foreign_key(table: &str, column: &str, value: &str) -> AppError {
    AppError::Database(DbErr::Custom(format!(
        "insert on {table} violates foreign key: {column} = {value} not found"
    )))
}

#[async_trait]
impl SpatialStore for MemoryStore {
    async fn upsert_satellite(&self, satellite: &Satellite) -> Result<UpsertOutcome> {
        let mut tables = self.tables()?;
        Ok(insert_once(
            &mut tables.satellites,
            satellite.id.clone(),
            satellite.clone(),
        ))
    }

    async fn upsert_item_type(&self, item_type: &ItemType) -> Result<UpsertOutcome> {
        let mut tables = self.tables()?;
        if !tables.satellites.contains_key(&item_type.sat_id) {
            return Err(foreign_key("item_types", "sat_id", &item_type.sat_id));
        }
        Ok(insert_once(
            &mut tables.item_types,
            item_type.id.clone(),
            item_type.clone(),
        ))
    }

    async fn upsert_asset_type(&self, asset_type: &AssetType) -> Result<UpsertOutcome> {
        let mut tables = self.tables()?;
        Ok(insert_once(
            &mut tables.asset_types,
            asset_type.id.clone(),
            asset_type.clone(),
        ))
    }

    async fn link_item_asset(&self, item_type_id: &str, asset_type_id: &str) -> Result<UpsertOutcome> {
        let mut tables = self.tables()?;
        if !tables.item_types.contains_key(item_type_id) {
            return Err(foreign_key("items_assets", "item_id", item_type_id));
        }
        if !tables.asset_types.contains_key(asset_type_id) {
            return Err(foreign_key("items_assets", "asset_id", asset_type_id));
        }
        let inserted = tables
            .items_assets
            .insert((item_type_id.to_string(), asset_type_id.to_string()));
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Skipped
        })
    }

    async fn upsert_image_feature(&self, image: &ImageFeature) -> Result<UpsertOutcome> {
        let mut tables = self.tables()?;
        if !tables.satellites.contains_key(&image.sat_id) {
            return Err(foreign_key("sat_images", "sat_id", &image.sat_id));
        }
        if !tables.item_types.contains_key(&image.item_type_id) {
            return Err(foreign_key("sat_images", "item_type_id", &image.item_type_id));
        }
        Ok(insert_once(
            &mut tables.sat_images,
            image.id.clone(),
            image.clone(),
        ))
    }

    async fn insert_country(&self, country: &Country) -> Result<UpsertOutcome> {
        let mut tables = self.tables()?;
        Ok(insert_once_ordered(
            &mut tables.countries,
            country.iso.clone(),
            country.clone(),
        ))
    }

    async fn insert_city(&self, city: &City) -> Result<UpsertOutcome> {
        let mut tables = self.tables()?;
        Ok(insert_once_ordered(&mut tables.cities, city.id, city.clone()))
    }

    async fn insert_land_cover_class(&self, class: &LandCoverClass) -> Result<UpsertOutcome> {
        let mut tables = self.tables()?;
        Ok(insert_once_ordered(
            &mut tables.land_cover_classes,
            class.id,
            class.clone(),
        ))
    }

    async fn countries(&self) -> Result<Vec<Country>> {
        Ok(self.tables()?.countries.values().cloned().collect())
    }

    async fn cities(&self) -> Result<Vec<City>> {
        Ok(self.tables()?.cities.values().cloned().collect())
    }

    async fn land_cover_classes(&self) -> Result<Vec<LandCoverClass>> {
        Ok(self.tables()?.land_cover_classes.values().cloned().collect())
    }

    async fn counts(&self) -> Result<TableCounts> {
        let tables = self.tables()?;
        Ok(TableCounts {
            satellites: tables.satellites.len() as u64,
            item_types: tables.item_types.len() as u64,
            asset_types: tables.asset_types.len() as u64,
            items_assets: tables.items_assets.len() as u64,
            sat_images: tables.sat_images.len() as u64,
            countries: tables.countries.len() as u64,
            cities: tables.cities.len() as u64,
            land_cover_classes: tables.land_cover_classes.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{self, Footprint};
    use chrono::{TimeZone, Utc};
    use geo::{point, polygon};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn satellite() -> Satellite {
        Satellite {
            id: "2424".into(),
            name: "Planetscope".into(),
            pixel_res: Some(3.0),
        }
    }

    fn item_type() -> ItemType {
        ItemType {
            id: "PSScene".into(),
            sat_id: "2424".into(),
        }
    }

    fn image(id: &str, cloud_cover: f64) -> ImageFeature {
        let polygon = polygon![
            (x: 13.3, y: 52.4),
            (x: 13.5, y: 52.4),
            (x: 13.5, y: 52.6),
            (x: 13.3, y: 52.6),
            (x: 13.3, y: 52.4),
        ];
        let (centroid, area_km2) = geometry::centroid_and_area(&polygon).unwrap();
        ImageFeature {
            id: id.into(),
            footprint: Footprint {
                polygon,
                centroid,
                area_km2,
            },
            cloud_cover,
            clear_confidence_percent: 90,
            time_acquired: Utc.with_ymd_and_hms(2022, 9, 1, 10, 0, 0).unwrap(),
            sat_id: "2424".into(),
            item_type_id: "PSScene".into(),
        }
    }

    #[tokio::test]
    async fn test_second_upsert_is_noop() {
        let store = MemoryStore::new();
        assert_eq!(
            store.upsert_satellite(&satellite()).await.unwrap(),
            UpsertOutcome::Inserted
        );
        store.upsert_item_type(&item_type()).await.unwrap();

        assert_eq!(
            store.upsert_image_feature(&image("img-1", 0.05)).await.unwrap(),
            UpsertOutcome::Inserted
        );
        // Same key with different data: no error, no overwrite
        assert_eq!(
            store.upsert_image_feature(&image("img-1", 0.5)).await.unwrap(),
            UpsertOutcome::Skipped
        );

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.sat_images, 1);
        assert_eq!(store.image("img-1").unwrap().unwrap().cloud_cover, 0.05);
    }

    #[tokio::test]
    async fn test_satellite_is_immutable() {
        let store = MemoryStore::new();
        store.upsert_satellite(&satellite()).await.unwrap();
        let renamed = Satellite {
            name: "Renamed".into(),
            ..satellite()
        };
        assert_eq!(
            store.upsert_satellite(&renamed).await.unwrap(),
            UpsertOutcome::Skipped
        );
        assert_eq!(store.satellite("2424").unwrap().unwrap().name, "Planetscope");
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let store = MemoryStore::new();
        let err = assert_err!(store.upsert_item_type(&item_type()).await);
        assert!(matches!(err, AppError::Database(_)));
        assert!(err.is_fatal());

        let err = assert_err!(store.upsert_image_feature(&image("img-1", 0.0)).await);
        assert!(matches!(err, AppError::Database(_)));

        assert_ok!(store.upsert_satellite(&satellite()).await);
        assert_ok!(store.upsert_item_type(&item_type()).await);
        assert_err!(store.link_item_asset("PSScene", "ortho_visual").await);
    }

    #[tokio::test]
    async fn test_links_are_idempotent() {
        let store = MemoryStore::new();
        store.upsert_satellite(&satellite()).await.unwrap();
        store.upsert_item_type(&item_type()).await.unwrap();
        store
            .upsert_asset_type(&AssetType {
                id: "ortho_visual".into(),
            })
            .await
            .unwrap();

        assert!(store
            .link_item_asset("PSScene", "ortho_visual")
            .await
            .unwrap()
            .is_inserted());
        assert_eq!(
            store.link_item_asset("PSScene", "ortho_visual").await.unwrap(),
            UpsertOutcome::Skipped
        );
        assert_eq!(store.counts().await.unwrap().items_assets, 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_writes() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_satellite(&satellite()).await.unwrap();
        store.upsert_item_type(&item_type()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert_image_feature(&image("img-1", 0.1)).await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_inserted() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.counts().await.unwrap().sat_images, 1);
    }

    #[tokio::test]
    async fn test_reference_snapshots() {
        let store = MemoryStore::new();
        let location = point!(x: 13.4, y: 52.5);
        let city = City {
            id: 7,
            name: "Berlin".into(),
            location,
            buffer: geometry::buffer_point(location, 30_000.0, 64).unwrap(),
        };
        assert!(store.insert_city(&city).await.unwrap().is_inserted());
        assert!(!store.insert_city(&city).await.unwrap().is_inserted());

        let cities = store.cities().await.unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].name, "Berlin");
        assert!(store.countries().await.unwrap().is_empty());
    }
}
