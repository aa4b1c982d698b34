//! Audit trail and run-summary repository
//!
//! The audit table is append-only: this repository exposes inserts and
//! reads, never updates or deletes.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;

use crate::entities::{pipeline_log, prelude::*, product_audit};
use crate::models::{AuditEntry, RunStats};

#[derive(Clone)]
pub struct AuditRepository {
    connection: Arc<DatabaseConnection>,
}

impl AuditRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Append one audit fact. Timestamped at write time.
    pub async fn record(&self, entry: AuditEntry) -> Result<()> {
        let model = product_audit::ActiveModel {
            product_number: Set(entry.product_number),
            timestamp: Set(Utc::now()),
            actor: Set(entry.actor),
            action: Set(entry.action),
            details: Set(entry.details),
            source_file: Set(entry.source_file),
            execution_time_ms: Set(entry.execution_time_ms),
            context: Set(entry.context),
            ..Default::default()
        };
        model.insert(&*self.connection).await?;
        Ok(())
    }

    /// Full audit trail for one product, oldest first.
    pub async fn find_for_product(
        &self,
        product_number: &str,
    ) -> Result<Vec<product_audit::Model>> {
        let entries = ProductAudit::find()
            .filter(product_audit::Column::ProductNumber.eq(product_number))
            .order_by_asc(product_audit::Column::Timestamp)
            .order_by_asc(product_audit::Column::Id)
            .all(&*self.connection)
            .await?;
        Ok(entries)
    }

    /// Audit entries for one action kind, newest first.
    pub async fn find_by_action(&self, action: &str) -> Result<Vec<product_audit::Model>> {
        let entries = ProductAudit::find()
            .filter(product_audit::Column::Action.eq(action))
            .order_by_desc(product_audit::Column::Timestamp)
            .all(&*self.connection)
            .await?;
        Ok(entries)
    }

    /// Audit entries in a time window, oldest first.
    pub async fn find_in_range(
        &self,
        from: chrono::DateTime<Utc>,
        to: chrono::DateTime<Utc>,
    ) -> Result<Vec<product_audit::Model>> {
        let entries = ProductAudit::find()
            .filter(product_audit::Column::Timestamp.gte(from))
            .filter(product_audit::Column::Timestamp.lt(to))
            .order_by_asc(product_audit::Column::Timestamp)
            .order_by_asc(product_audit::Column::Id)
            .all(&*self.connection)
            .await?;
        Ok(entries)
    }

    /// Count of entries for one action kind.
    pub async fn count_by_action(&self, action: &str) -> Result<u64> {
        let count = ProductAudit::find()
            .filter(product_audit::Column::Action.eq(action))
            .count(&*self.connection)
            .await?;
        Ok(count)
    }

    /// Persist the summary row for a finished pipeline run.
    pub async fn record_run(&self, stats: &RunStats, status: &str) -> Result<()> {
        let model = pipeline_log::ActiveModel {
            run_id: Set(stats.run_id),
            pipeline: Set(stats.pipeline.clone()),
            started_at: Set(stats.started_at),
            finished_at: Set(Utc::now()),
            total: Set(stats.total as i64),
            successful: Set(stats.successful as i64),
            failed: Set(stats.failed as i64),
            skipped: Set(stats.skipped as i64),
            duration_ms: Set(stats.duration_ms as i64),
            status: Set(status.to_string()),
            ..Default::default()
        };
        model.insert(&*self.connection).await?;
        Ok(())
    }

    /// Most recent run summaries for one pipeline.
    pub async fn recent_runs(&self, pipeline: &str, limit: u64) -> Result<Vec<pipeline_log::Model>> {
        let runs = PipelineLogs::find()
            .filter(pipeline_log::Column::Pipeline.eq(pipeline))
            .order_by_desc(pipeline_log::Column::StartedAt)
            .limit(limit)
            .all(&*self.connection)
            .await?;
        Ok(runs)
    }
}
