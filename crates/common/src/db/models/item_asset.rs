//! Item type to asset type link

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items_assets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub item_id: String,

    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub asset_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::item_type::Entity",
        from = "Column::ItemId",
        to = "super::item_type::Column::Id"
    )]
    ItemType,

    #[sea_orm(
        belongs_to = "super::asset_type::Entity",
        from = "Column::AssetId",
        to = "super::asset_type::Column::Id"
    )]
    AssetType,
}

impl Related<super::item_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ItemType.def()
    }
}

impl Related<super::asset_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssetType.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
