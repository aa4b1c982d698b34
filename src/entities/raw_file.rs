//! One ingested source dump file.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "raw_file")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub file_name: String,
    pub file_date: Date,
    pub row_count: Option<i32>,
    pub imported_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::raw_row::Entity")]
    RawRows,
}

impl Related<super::raw_row::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawRows.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
