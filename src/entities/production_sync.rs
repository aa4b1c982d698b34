//! One production deployment batch for a product.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "production_sync")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_number: String,
    pub files_synced: i32,
    pub total_bytes: i64,
    pub synced_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
