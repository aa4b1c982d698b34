//! Repository for raw source dumps: the file record, its archived rows,
//! and the processed-file ledger that makes ingestion idempotent.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::warn;

use crate::entities::{prelude::*, product_history_file, raw_file, raw_row};
use crate::errors::IngestError;
use crate::models::RawFileDescriptor;

/// Rows are archived in chunks to keep statement sizes bounded.
const ROW_INSERT_CHUNK: usize = 500;

#[derive(Clone)]
pub struct RawFileRepository {
    connection: Arc<DatabaseConnection>,
}

impl RawFileRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// True when the file name is already in the processed-file ledger.
    pub async fn is_ingested(&self, file_name: &str) -> Result<bool, IngestError> {
        let existing = ProductHistoryFiles::find()
            .filter(product_history_file::Column::FileName.eq(file_name))
            .one(&*self.connection)
            .await?;
        Ok(existing.is_some())
    }

    /// Create the raw file record for a new dump.
    ///
    /// A record whose file name is already present can only come from an
    /// ingest that died before reaching the ledger; it is reclaimed so the
    /// retry proceeds instead of tripping over the unique file name.
    pub async fn create(&self, descriptor: &RawFileDescriptor) -> Result<raw_file::Model, IngestError> {
        if let Some(stalled) = self.find_by_name(&descriptor.file_name).await? {
            warn!(
                file = %descriptor.file_name,
                "Reusing file record left by an interrupted ingest"
            );
            RawRows::delete_many()
                .filter(raw_row::Column::FileId.eq(stalled.id))
                .exec(&*self.connection)
                .await?;
            let mut model: raw_file::ActiveModel = stalled.into();
            model.file_date = Set(descriptor.file_date);
            model.row_count = Set(None);
            model.imported_at = Set(Utc::now());
            let reclaimed = model.update(&*self.connection).await?;
            return Ok(reclaimed);
        }

        let model = raw_file::ActiveModel {
            file_name: Set(descriptor.file_name.clone()),
            file_date: Set(descriptor.file_date),
            row_count: Set(None),
            imported_at: Set(Utc::now()),
            ..Default::default()
        };
        let inserted = model.insert(&*self.connection).await?;
        Ok(inserted)
    }

    /// Archive the dump's rows verbatim under the file record.
    pub async fn insert_rows(&self, file_id: i64, rows: &[JsonValue]) -> Result<(), IngestError> {
        for chunk in rows.chunks(ROW_INSERT_CHUNK) {
            let models: Vec<raw_row::ActiveModel> = chunk
                .iter()
                .map(|row| raw_row::ActiveModel {
                    file_id: Set(file_id),
                    row_data: Set(row.clone()),
                    ..Default::default()
                })
                .collect();
            RawRows::insert_many(models).exec(&*self.connection).await?;
        }
        Ok(())
    }

    /// Set the final row count once the dump is fully archived.
    pub async fn set_row_count(&self, file_id: i64, count: i32) -> Result<(), IngestError> {
        let model = raw_file::ActiveModel {
            id: Set(file_id),
            row_count: Set(Some(count)),
            ..Default::default()
        };
        model.update(&*self.connection).await?;
        Ok(())
    }

    /// Record the file in the ledger so a re-run skips it.
    pub async fn mark_ingested(&self, descriptor: &RawFileDescriptor) -> Result<(), IngestError> {
        let model = product_history_file::ActiveModel {
            file_name: Set(descriptor.file_name.clone()),
            file_date: Set(descriptor.file_date),
            processed_at: Set(Utc::now()),
            ..Default::default()
        };
        model.insert(&*self.connection).await?;
        Ok(())
    }

    /// Archived rows for one file, in insertion order.
    pub async fn rows_for_file(&self, file_id: i64) -> Result<Vec<raw_row::Model>, IngestError> {
        let rows = RawRows::find()
            .filter(raw_row::Column::FileId.eq(file_id))
            .all(&*self.connection)
            .await?;
        Ok(rows)
    }

    pub async fn find_by_name(
        &self,
        file_name: &str,
    ) -> Result<Option<raw_file::Model>, IngestError> {
        let file = RawFiles::find()
            .filter(raw_file::Column::FileName.eq(file_name))
            .one(&*self.connection)
            .await?;
        Ok(file)
    }
}
