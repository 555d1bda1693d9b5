//! Asset type entity, shared across item types

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset_types")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::item_asset::Entity")]
    ItemAssets,
}

impl Related<super::item_type::Entity> for Entity {
    fn to() -> RelationDef {
        super::item_asset::Relation::ItemType.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::item_asset::Relation::AssetType.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
