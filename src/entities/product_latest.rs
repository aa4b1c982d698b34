//! Per-product projection of the current history row, volatile fields
//! stripped. A cache, never the source of truth; fully recomputable.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "product_latest")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_number: String,
    pub alternate_number: Option<String>,
    pub file_date: Date,
    pub payload: Json,
    pub content_hash: String,
    pub refreshed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
