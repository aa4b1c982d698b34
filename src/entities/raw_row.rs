//! One JSON row owned by a raw file; deleted cascading with it.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "raw_row")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub file_id: i64,
    pub row_data: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::raw_file::Entity",
        from = "Column::FileId",
        to = "super::raw_file::Column::Id",
        on_delete = "Cascade"
    )]
    RawFile,
}

impl Related<super::raw_file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawFile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
