//! Run-summary ledger, one row per pipeline run.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "pipeline_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub run_id: Uuid,
    pub pipeline: String,
    pub started_at: DateTimeUtc,
    pub finished_at: DateTimeUtc,
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub skipped: i64,
    pub duration_ms: i64,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
