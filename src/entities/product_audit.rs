//! Append-only audit fact for one product action.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "product_audit")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_number: String,
    pub timestamp: DateTimeUtc,
    pub actor: String,
    pub action: String,
    pub details: Option<String>,
    pub source_file: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub context: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
