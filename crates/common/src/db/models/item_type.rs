//! Item type entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "item_types")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub sat_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::satellite::Entity",
        from = "Column::SatId",
        to = "super::satellite::Column::Id"
    )]
    Satellite,

    #[sea_orm(has_many = "super::item_asset::Entity")]
    ItemAssets,
}

impl Related<super::satellite::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Satellite.def()
    }
}

impl Related<super::asset_type::Entity> for Entity {
    fn to() -> RelationDef {
        super::item_asset::Relation::AssetType.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::item_asset::Relation::ItemType.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
