//! PostGIS schema bootstrap
//!
//! Every statement is `IF NOT EXISTS`, so the whole list runs on each start.

pub(crate) const STATEMENTS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS postgis",
    r#"
    CREATE TABLE IF NOT EXISTS satellites (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        pixel_res DOUBLE PRECISION
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS item_types (
        id TEXT PRIMARY KEY,
        sat_id TEXT NOT NULL REFERENCES satellites (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS asset_types (
        id TEXT PRIMARY KEY
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items_assets (
        item_id TEXT NOT NULL REFERENCES item_types (id),
        asset_id TEXT NOT NULL REFERENCES asset_types (id),
        PRIMARY KEY (item_id, asset_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sat_images (
        id TEXT PRIMARY KEY,
        cloud_cover DOUBLE PRECISION NOT NULL CHECK (cloud_cover BETWEEN 0 AND 1),
        clear_confidence_percent INTEGER NOT NULL CHECK (clear_confidence_percent BETWEEN 0 AND 100),
        time_acquired TIMESTAMPTZ NOT NULL,
        geom geometry(Polygon, 4326) NOT NULL,
        centroid geometry(Point, 4326) NOT NULL,
        area_sqkm DOUBLE PRECISION NOT NULL,
        sat_id TEXT NOT NULL REFERENCES satellites (id),
        item_type_id TEXT NOT NULL REFERENCES item_types (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS countries (
        iso TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        geom geometry(MultiPolygon, 4326) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cities (
        id BIGINT PRIMARY KEY,
        name TEXT NOT NULL,
        geom geometry(Point, 4326) NOT NULL,
        buffer geometry(Polygon, 4326) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS land_cover_classes (
        id BIGINT PRIMARY KEY,
        featureclass TEXT NOT NULL,
        geom geometry(Geometry, 4326) NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS sat_images_geom_idx ON sat_images USING GIST (geom)",
    "CREATE INDEX IF NOT EXISTS sat_images_centroid_idx ON sat_images USING GIST (centroid)",
    "CREATE INDEX IF NOT EXISTS countries_geom_idx ON countries USING GIST (geom)",
    "CREATE INDEX IF NOT EXISTS cities_geom_idx ON cities USING GIST (geom)",
    "CREATE INDEX IF NOT EXISTS cities_buffer_idx ON cities USING GIST (buffer)",
    "CREATE INDEX IF NOT EXISTS land_cover_classes_geom_idx ON land_cover_classes USING GIST (geom)",
    "CREATE INDEX IF NOT EXISTS sat_images_time_acquired_idx ON sat_images (time_acquired)",
];
