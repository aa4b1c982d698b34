//! One versioned snapshot of a product's data, tied to one import file date.
//!
//! Invariant: per product number at most one row has `is_current = true`,
//! and it is the row with the newest file date.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "product_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_number: String,
    pub alternate_number: Option<String>,
    pub raw_file_id: i64,
    pub file_date: Date,
    pub source_modified_at: Option<DateTimeUtc>,
    pub payload: Json,
    /// 64-character hex SHA-256 of the canonicalized payload.
    pub content_hash: String,
    pub is_current: bool,
    pub imported_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::raw_file::Entity",
        from = "Column::RawFileId",
        to = "super::raw_file::Column::Id"
    )]
    RawFile,
}

impl Related<super::raw_file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawFile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
