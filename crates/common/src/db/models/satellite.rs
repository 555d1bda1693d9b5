//! Satellite entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "satellites")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    /// Meters per pixel
    pub pixel_res: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::item_type::Entity")]
    ItemTypes,

    #[sea_orm(has_many = "super::sat_image::Entity")]
    SatImages,
}

impl Related<super::item_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ItemTypes.def()
    }
}

impl Related<super::sat_image::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SatImages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
