//! SeaORM entity models
//!
//! Scalar columns only. Geometry columns are handled by the repository's raw
//! PostGIS statements.

mod satellite;
mod item_type;
mod asset_type;
mod item_asset;
mod sat_image;
mod country;
mod city;
mod land_cover_class;

pub use satellite::{
    Entity as SatelliteEntity,
    ActiveModel as SatelliteActiveModel,
    Column as SatelliteColumn,
};

pub use item_type::{
    Entity as ItemTypeEntity,
    ActiveModel as ItemTypeActiveModel,
    Column as ItemTypeColumn,
};

pub use asset_type::{
    Entity as AssetTypeEntity,
    ActiveModel as AssetTypeActiveModel,
    Column as AssetTypeColumn,
};

pub use item_asset::{
    Entity as ItemAssetEntity,
    ActiveModel as ItemAssetActiveModel,
    Column as ItemAssetColumn,
};

pub use sat_image::Entity as SatImageEntity;

pub use country::Entity as CountryEntity;

pub use city::Entity as CityEntity;

pub use land_cover_class::Entity as LandCoverClassEntity;
