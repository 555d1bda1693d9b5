//! Satellite image entity
//!
//! Geometry columns (`geom`, `centroid`) have no ORM type; they are written and
//! read through explicit PostGIS statements in the repository.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sat_images")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    pub cloud_cover: f64,

    pub clear_confidence_percent: i32,

    pub time_acquired: DateTimeWithTimeZone,

    /// Equal-area footprint area in km²
    pub area_sqkm: f64,

    #[sea_orm(column_type = "Text")]
    pub sat_id: String,

    #[sea_orm(column_type = "Text")]
    pub item_type_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::satellite::Entity",
        from = "Column::SatId",
        to = "super::satellite::Column::Id"
    )]
    Satellite,

    #[sea_orm(
        belongs_to = "super::item_type::Entity",
        from = "Column::ItemTypeId",
        to = "super::item_type::Column::Id"
    )]
    ItemType,
}

impl Related<super::satellite::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Satellite.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
