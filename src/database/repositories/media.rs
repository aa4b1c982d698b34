//! Repository for media pipeline byproducts: generated format artifacts
//! and production deployment batches.

use anyhow::Result;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

use crate::entities::{format_history, prelude::*, production_sync};

#[derive(Clone)]
pub struct MediaActivityRepository {
    connection: Arc<DatabaseConnection>,
}

impl MediaActivityRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Record one generated format artifact for a product.
    pub async fn record_format(
        &self,
        product_number: &str,
        format_name: &str,
        file_path: &str,
        file_size_bytes: Option<i64>,
    ) -> Result<()> {
        let model = format_history::ActiveModel {
            product_number: Set(product_number.to_string()),
            format_name: Set(format_name.to_string()),
            file_path: Set(Some(file_path.to_string())),
            file_size_bytes: Set(file_size_bytes),
            generated_at: Set(Utc::now()),
            ..Default::default()
        };
        model.insert(&*self.connection).await?;
        Ok(())
    }

    /// All recorded format artifacts for one product, newest first.
    pub async fn formats_for_product(
        &self,
        product_number: &str,
    ) -> Result<Vec<format_history::Model>> {
        let rows = FormatHistory::find()
            .filter(format_history::Column::ProductNumber.eq(product_number))
            .order_by_desc(format_history::Column::GeneratedAt)
            .all(&*self.connection)
            .await?;
        Ok(rows)
    }

    /// Record one production deployment batch for a product.
    pub async fn record_sync(
        &self,
        product_number: &str,
        files_synced: i32,
        total_bytes: i64,
    ) -> Result<()> {
        let model = production_sync::ActiveModel {
            product_number: Set(product_number.to_string()),
            files_synced: Set(files_synced),
            total_bytes: Set(total_bytes),
            synced_at: Set(Utc::now()),
            ..Default::default()
        };
        model.insert(&*self.connection).await?;
        Ok(())
    }

    /// Deployment batches for one product, newest first.
    pub async fn syncs_for_product(
        &self,
        product_number: &str,
    ) -> Result<Vec<production_sync::Model>> {
        let rows = ProductionSync::find()
            .filter(production_sync::Column::ProductNumber.eq(product_number))
            .order_by_desc(production_sync::Column::SyncedAt)
            .all(&*self.connection)
            .await?;
        Ok(rows)
    }
}
