//! PostGIS repository
//!
//! Implements the store contract over SeaORM. Scalar tables go through their
//! entities with `ON CONFLICT (pk) DO NOTHING`; geometry tables use explicit
//! statements because the ORM has no geometry type. Geometry travels as GeoJSON
//! text in both directions.

use crate::config::DatabaseConfig;
use crate::db::models::*;
use crate::db::{schema, DbPool};
use crate::domain::{AssetType, City, Country, ImageFeature, ItemType, LandCoverClass, Satellite};
use crate::errors::{AppError, Result};
use crate::geometry;
use crate::store::{SpatialStore, TableCounts, UpsertOutcome};
use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait, Set, Statement,
};
use tracing::{debug, info, instrument};

/// Repository for data access operations
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open the pool described by `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Ok(Self::new(DbPool::new(config).await?))
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create the PostGIS extension, tables, and spatial indexes if missing
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        for statement in schema::STATEMENTS {
            self.write_conn().execute_unprepared(statement).await?;
        }
        info!(statements = schema::STATEMENTS.len(), "Schema ready");
        Ok(())
    }

    /// Close the pool at the end of a run
    pub async fn close(self) -> Result<()> {
        self.pool.close().await
    }

    async fn execute_insert(&self, sql: &str, values: Vec<sea_orm::Value>) -> Result<UpsertOutcome> {
        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);
        let result = self.write_conn().execute(stmt).await?;
        Ok(UpsertOutcome::from_rows_affected(result.rows_affected()))
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<sea_orm::QueryResult>> {
        let stmt = Statement::from_string(DbBackend::Postgres, sql.to_string());
        Ok(self.read_conn().query_all(stmt).await?)
    }
}

fn geojson_text(value: geojson::Value) -> Result<String> {
    Ok(serde_json::to_string(&geojson::Geometry::new(value))?)
}

fn parse_geometry(text: &str) -> Result<geo::Geometry<f64>> {
    let geometry: geojson::Geometry = serde_json::from_str(text)?;
    geo::Geometry::<f64>::try_from(geometry).map_err(|e| AppError::Internal {
        message: format!("Unreadable stored geometry: {}", e),
    })
}

fn unexpected(table: &str, geometry: &geo::Geometry<f64>) -> AppError {
    AppError::Internal {
        message: format!("Unexpected geometry in {}: {:?}", table, geometry),
    }
}

#[async_trait]
impl SpatialStore for Repository {
    // ========================================================================
    // Ingested entities
    // ========================================================================

    async fn upsert_satellite(&self, satellite: &Satellite) -> Result<UpsertOutcome> {
        let model = SatelliteActiveModel {
            id: Set(satellite.id.clone()),
            name: Set(satellite.name.clone()),
            pixel_res: Set(satellite.pixel_res),
        };

        let rows = SatelliteEntity::insert(model)
            .on_conflict(OnConflict::column(SatelliteColumn::Id).do_nothing().to_owned())
            .exec_without_returning(self.write_conn())
            .await?;

        Ok(UpsertOutcome::from_rows_affected(rows))
    }

    async fn upsert_item_type(&self, item_type: &ItemType) -> Result<UpsertOutcome> {
        let model = ItemTypeActiveModel {
            id: Set(item_type.id.clone()),
            sat_id: Set(item_type.sat_id.clone()),
        };

        let rows = ItemTypeEntity::insert(model)
            .on_conflict(OnConflict::column(ItemTypeColumn::Id).do_nothing().to_owned())
            .exec_without_returning(self.write_conn())
            .await?;

        Ok(UpsertOutcome::from_rows_affected(rows))
    }

    async fn upsert_asset_type(&self, asset_type: &AssetType) -> Result<UpsertOutcome> {
        let model = AssetTypeActiveModel {
            id: Set(asset_type.id.clone()),
        };

        let rows = AssetTypeEntity::insert(model)
            .on_conflict(OnConflict::column(AssetTypeColumn::Id).do_nothing().to_owned())
            .exec_without_returning(self.write_conn())
            .await?;

        Ok(UpsertOutcome::from_rows_affected(rows))
    }

    async fn link_item_asset(&self, item_type_id: &str, asset_type_id: &str) -> Result<UpsertOutcome> {
        let model = ItemAssetActiveModel {
            item_id: Set(item_type_id.to_string()),
            asset_id: Set(asset_type_id.to_string()),
        };

        let rows = ItemAssetEntity::insert(model)
            .on_conflict(
                OnConflict::columns([ItemAssetColumn::ItemId, ItemAssetColumn::AssetId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.write_conn())
            .await?;

        Ok(UpsertOutcome::from_rows_affected(rows))
    }

    #[instrument(skip_all, fields(image_id = %image.id))]
    async fn upsert_image_feature(&self, image: &ImageFeature) -> Result<UpsertOutcome> {
        let footprint = &image.footprint;
        let outcome = self
            .execute_insert(
                r#"
                INSERT INTO sat_images (
                    id, cloud_cover, clear_confidence_percent, time_acquired,
                    geom, centroid, area_sqkm, sat_id, item_type_id
                )
                VALUES (
                    $1, $2, $3, $4,
                    ST_SetSRID(ST_GeomFromGeoJSON($5), 4326),
                    ST_SetSRID(ST_GeomFromGeoJSON($6), 4326),
                    $7, $8, $9
                )
                ON CONFLICT (id) DO NOTHING
                "#,
                vec![
                    image.id.clone().into(),
                    image.cloud_cover.into(),
                    image.clear_confidence_percent.into(),
                    image.time_acquired.into(),
                    geojson_text(geojson::Value::from(&footprint.polygon))?.into(),
                    geojson_text(geojson::Value::from(&footprint.centroid))?.into(),
                    footprint.area_km2.into(),
                    image.sat_id.clone().into(),
                    image.item_type_id.clone().into(),
                ],
            )
            .await?;

        debug!(outcome = ?outcome, "Image upserted");
        Ok(outcome)
    }

    // ========================================================================
    // Reference data
    // ========================================================================

    async fn insert_country(&self, country: &Country) -> Result<UpsertOutcome> {
        self.execute_insert(
            r#"
            INSERT INTO countries (iso, name, geom)
            VALUES ($1, $2, ST_SetSRID(ST_GeomFromGeoJSON($3), 4326))
            ON CONFLICT (iso) DO NOTHING
            "#,
            vec![
                country.iso.clone().into(),
                country.name.clone().into(),
                geojson_text(geojson::Value::from(&country.geom))?.into(),
            ],
        )
        .await
    }

    async fn insert_city(&self, city: &City) -> Result<UpsertOutcome> {
        self.execute_insert(
            r#"
            INSERT INTO cities (id, name, geom, buffer)
            VALUES (
                $1, $2,
                ST_SetSRID(ST_GeomFromGeoJSON($3), 4326),
                ST_SetSRID(ST_GeomFromGeoJSON($4), 4326)
            )
            ON CONFLICT (id) DO NOTHING
            "#,
            vec![
                city.id.into(),
                city.name.clone().into(),
                geojson_text(geojson::Value::from(&city.location))?.into(),
                geojson_text(geojson::Value::from(&city.buffer))?.into(),
            ],
        )
        .await
    }

    async fn insert_land_cover_class(&self, class: &LandCoverClass) -> Result<UpsertOutcome> {
        self.execute_insert(
            r#"
            INSERT INTO land_cover_classes (id, featureclass, geom)
            VALUES ($1, $2, ST_SetSRID(ST_GeomFromGeoJSON($3), 4326))
            ON CONFLICT (id) DO NOTHING
            "#,
            vec![
                class.id.into(),
                class.featureclass.clone().into(),
                geojson_text(geojson::Value::from(&class.geom))?.into(),
            ],
        )
        .await
    }

    async fn countries(&self) -> Result<Vec<Country>> {
        let rows = self
            .query_rows("SELECT iso, name, ST_AsGeoJSON(geom) FROM countries ORDER BY iso")
            .await?;

        rows.into_iter()
            .map(|row| {
                let geom = match parse_geometry(&row.try_get_by_index::<String>(2)?)? {
                    geo::Geometry::MultiPolygon(multi) => multi,
                    geo::Geometry::Polygon(polygon) => geometry::promote(polygon),
                    other => return Err(unexpected("countries", &other)),
                };
                Ok(Country {
                    iso: row.try_get_by_index(0)?,
                    name: row.try_get_by_index(1)?,
                    geom,
                })
            })
            .collect()
    }

    async fn cities(&self) -> Result<Vec<City>> {
        let rows = self
            .query_rows(
                "SELECT id, name, ST_AsGeoJSON(geom), ST_AsGeoJSON(buffer) FROM cities ORDER BY id",
            )
            .await?;

        rows.into_iter()
            .map(|row| {
                let location = match parse_geometry(&row.try_get_by_index::<String>(2)?)? {
                    geo::Geometry::Point(point) => point,
                    other => return Err(unexpected("cities", &other)),
                };
                let buffer = match parse_geometry(&row.try_get_by_index::<String>(3)?)? {
                    geo::Geometry::Polygon(polygon) => polygon,
                    other => return Err(unexpected("cities", &other)),
                };
                Ok(City {
                    id: row.try_get_by_index(0)?,
                    name: row.try_get_by_index(1)?,
                    location,
                    buffer,
                })
            })
            .collect()
    }

    async fn land_cover_classes(&self) -> Result<Vec<LandCoverClass>> {
        let rows = self
            .query_rows(
                "SELECT id, featureclass, ST_AsGeoJSON(geom) FROM land_cover_classes ORDER BY id",
            )
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(LandCoverClass {
                    id: row.try_get_by_index(0)?,
                    featureclass: row.try_get_by_index(1)?,
                    geom: parse_geometry(&row.try_get_by_index::<String>(2)?)?,
                })
            })
            .collect()
    }

    async fn counts(&self) -> Result<TableCounts> {
        let conn = self.read_conn();
        Ok(TableCounts {
            satellites: SatelliteEntity::find().count(conn).await?,
            item_types: ItemTypeEntity::find().count(conn).await?,
            asset_types: AssetTypeEntity::find().count(conn).await?,
            items_assets: ItemAssetEntity::find().count(conn).await?,
            sat_images: SatImageEntity::find().count(conn).await?,
            countries: CountryEntity::find().count(conn).await?,
            cities: CityEntity::find().count(conn).await?,
            land_cover_classes: LandCoverClassEntity::find().count(conn).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Footprint;
    use chrono::{TimeZone, Utc};
    use geo::polygon;
    use sea_orm::{MockDatabase, MockExecResult};

    fn exec(rows_affected: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected,
        }
    }

    fn repository(results: Vec<MockExecResult>) -> Repository {
        let primary = MockDatabase::new(DbBackend::Postgres)
            .append_exec_results(results)
            .into_connection();
        Repository::new(DbPool {
            primary,
            replica: None,
        })
    }

    fn satellite() -> Satellite {
        Satellite {
            id: "2424".into(),
            name: "Planetscope".into(),
            pixel_res: Some(3.0),
        }
    }

    fn log_of(repo: Repository) -> String {
        format!("{:?}", repo.pool.primary.into_transaction_log())
    }

    #[tokio::test]
    async fn test_conflict_maps_to_skipped() {
        let repo = repository(vec![exec(1), exec(0)]);

        assert_eq!(
            repo.upsert_satellite(&satellite()).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            repo.upsert_satellite(&satellite()).await.unwrap(),
            UpsertOutcome::Skipped
        );

        let log = log_of(repo);
        assert!(log.contains("ON CONFLICT"));
        assert!(log.contains("DO NOTHING"));
    }

    #[tokio::test]
    async fn test_link_uses_composite_key() {
        let repo = repository(vec![exec(0)]);
        assert_eq!(
            repo.link_item_asset("PSScene", "ortho_visual").await.unwrap(),
            UpsertOutcome::Skipped
        );
        let log = log_of(repo);
        assert!(log.contains("items_assets"));
        assert!(log.contains("item_id") && log.contains("asset_id"));
        assert!(log.contains("DO NOTHING"));
    }

    #[tokio::test]
    async fn test_image_insert_writes_geojson() {
        let repo = repository(vec![exec(1)]);
        let polygon = polygon![
            (x: 13.3, y: 52.4),
            (x: 13.5, y: 52.4),
            (x: 13.5, y: 52.6),
            (x: 13.3, y: 52.4),
        ];
        let (centroid, area_km2) = geometry::centroid_and_area(&polygon).unwrap();
        let image = ImageFeature {
            id: "img-1".into(),
            footprint: Footprint {
                polygon,
                centroid,
                area_km2,
            },
            cloud_cover: 0.05,
            clear_confidence_percent: 95,
            time_acquired: Utc.with_ymd_and_hms(2022, 9, 1, 10, 0, 0).unwrap(),
            sat_id: "2424".into(),
            item_type_id: "PSScene".into(),
        };

        assert!(repo.upsert_image_feature(&image).await.unwrap().is_inserted());

        let log = log_of(repo);
        assert!(log.contains("ST_GeomFromGeoJSON"));
        assert!(log.contains("Polygon"));
        assert!(log.contains("ON CONFLICT (id) DO NOTHING"));
    }

    #[test]
    fn test_geojson_text_round_trip() {
        let polygon = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let text = geojson_text(geojson::Value::from(&polygon)).unwrap();
        assert!(text.contains("\"Polygon\""));
        match parse_geometry(&text).unwrap() {
            geo::Geometry::Polygon(parsed) => assert_eq!(parsed, polygon),
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[test]
    fn test_parse_geometry_rejects_garbage() {
        assert!(parse_geometry("not json").is_err());
    }
}
