//! One generated output artifact for a product.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "format_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_number: String,
    pub format_name: String,
    pub file_path: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub generated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
