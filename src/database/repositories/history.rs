//! Versioned snapshot store for product data.
//!
//! `product_history` is append-only per (product, file date); the
//! `is_current` flag is the only mutable bit and always points at the row
//! with the newest file date. `product_latest` is a derived projection
//! refreshed after writes, never read back as a source of truth.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseBackend, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::entities::{prelude::*, product_history, product_latest};
use crate::errors::{HistoryError, IngestError};
use crate::ingestor::diff::{diff_payloads, strip_volatile};
use crate::models::{SnapshotDecision, SnapshotDiff, SnapshotRecord};

/// One candidate snapshot, validated and hashed, ready to apply.
#[derive(Debug, Clone)]
pub struct SnapshotInput {
    pub product_number: String,
    pub alternate_number: Option<String>,
    pub raw_file_id: i64,
    pub file_date: NaiveDate,
    pub source_modified_at: Option<DateTime<Utc>>,
    pub payload: JsonValue,
    pub content_hash: String,
}

#[derive(Clone)]
pub struct HistoryRepository {
    connection: Arc<DatabaseConnection>,
    backend: DatabaseBackend,
}

impl HistoryRepository {
    pub fn new(connection: Arc<DatabaseConnection>, backend: DatabaseBackend) -> Self {
        Self {
            connection,
            backend,
        }
    }

    /// Apply one candidate snapshot against the store.
    ///
    /// Decides insert / unchanged / replace / flip inside a single
    /// transaction. The partial unique index on `(product_number) WHERE
    /// is_current` backs the at-most-one-current invariant even when two
    /// ingests race on a brand-new product and neither has a row to lock:
    /// the loser's insert collides, is retried once against the winner's
    /// committed pointer, and a second collision surfaces as
    /// `ConcurrentModification`.
    pub async fn apply_snapshot(
        &self,
        input: &SnapshotInput,
    ) -> Result<SnapshotDecision, IngestError> {
        match self.try_apply(input).await {
            Err(IngestError::Database(err)) if is_conflict(&err) => {
                match self.try_apply(input).await {
                    Err(IngestError::Database(err)) if is_conflict(&err) => {
                        Err(IngestError::ConcurrentModification {
                            entity: input.product_number.clone(),
                        })
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn try_apply(&self, input: &SnapshotInput) -> Result<SnapshotDecision, IngestError> {
        let txn = self.connection.begin().await?;

        let mut query = ProductHistory::find()
            .filter(product_history::Column::ProductNumber.eq(&input.product_number))
            .filter(product_history::Column::IsCurrent.eq(true));
        // Row locks only exist on Postgres; SQLite serializes writers anyway.
        if self.backend == DatabaseBackend::Postgres {
            query = query.lock_exclusive();
        }
        let current = query.one(&txn).await?;

        let decision = match current {
            None => {
                self.insert_row(&txn, input, true).await?;
                SnapshotDecision::Inserted
            }
            Some(ref row) if row.content_hash == input.content_hash => {
                SnapshotDecision::Unchanged
            }
            Some(row) if row.file_date == input.file_date => {
                // Corrected re-export for the pointer's own date: the row is
                // replaced in place rather than versioned.
                self.replace_row(&txn, row, input).await?;
                SnapshotDecision::Flipped
            }
            Some(ref row) if input.file_date < row.file_date => {
                // Late-arriving older dump: keep it as history, leave the
                // pointer on the newer row. A correction for a date already
                // on record replaces that row.
                let existing = ProductHistory::find()
                    .filter(product_history::Column::ProductNumber.eq(&input.product_number))
                    .filter(product_history::Column::FileDate.eq(input.file_date))
                    .one(&txn)
                    .await?;
                match existing {
                    Some(ref old) if old.content_hash == input.content_hash => {
                        SnapshotDecision::Unchanged
                    }
                    Some(old) => {
                        self.replace_row(&txn, old, input).await?;
                        SnapshotDecision::Flipped
                    }
                    None => {
                        self.insert_row(&txn, input, false).await?;
                        SnapshotDecision::Inserted
                    }
                }
            }
            Some(row) => {
                let mut previous: product_history::ActiveModel = row.into();
                previous.is_current = Set(false);
                previous.update(&txn).await?;
                self.insert_row(&txn, input, true).await?;
                SnapshotDecision::Flipped
            }
        };

        txn.commit().await?;
        Ok(decision)
    }

    async fn insert_row(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        input: &SnapshotInput,
        is_current: bool,
    ) -> Result<(), IngestError> {
        let model = product_history::ActiveModel {
            product_number: Set(input.product_number.clone()),
            alternate_number: Set(input.alternate_number.clone()),
            raw_file_id: Set(input.raw_file_id),
            file_date: Set(input.file_date),
            source_modified_at: Set(input.source_modified_at),
            payload: Set(input.payload.clone()),
            content_hash: Set(input.content_hash.clone()),
            is_current: Set(is_current),
            imported_at: Set(Utc::now()),
            ..Default::default()
        };
        model.insert(txn).await?;
        Ok(())
    }

    /// Overwrite an existing snapshot row with a corrected payload for the
    /// same file date. The `is_current` flag is left untouched.
    async fn replace_row(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        row: product_history::Model,
        input: &SnapshotInput,
    ) -> Result<(), IngestError> {
        let mut model: product_history::ActiveModel = row.into();
        model.alternate_number = Set(input.alternate_number.clone());
        model.raw_file_id = Set(input.raw_file_id);
        model.source_modified_at = Set(input.source_modified_at);
        model.payload = Set(input.payload.clone());
        model.content_hash = Set(input.content_hash.clone());
        model.imported_at = Set(Utc::now());
        model.update(txn).await?;
        Ok(())
    }

    /// Rebuild the `product_latest` projection row from the current
    /// snapshot, with volatile fields stripped from the stored payload.
    pub async fn refresh_latest(
        &self,
        product_number: &str,
        volatile_fields: &[String],
    ) -> Result<(), IngestError> {
        let Some(current) = ProductHistory::find()
            .filter(product_history::Column::ProductNumber.eq(product_number))
            .filter(product_history::Column::IsCurrent.eq(true))
            .one(&*self.connection)
            .await?
        else {
            return Ok(());
        };

        let payload = strip_volatile(&current.payload, volatile_fields);

        let model = product_latest::ActiveModel {
            product_number: Set(current.product_number),
            alternate_number: Set(current.alternate_number),
            file_date: Set(current.file_date),
            payload: Set(payload),
            content_hash: Set(current.content_hash),
            refreshed_at: Set(Utc::now()),
        };

        ProductLatest::insert(model)
            .on_conflict(
                OnConflict::column(product_latest::Column::ProductNumber)
                    .update_columns([
                        product_latest::Column::AlternateNumber,
                        product_latest::Column::FileDate,
                        product_latest::Column::Payload,
                        product_latest::Column::ContentHash,
                        product_latest::Column::RefreshedAt,
                    ])
                    .to_owned(),
            )
            .exec(&*self.connection)
            .await?;
        Ok(())
    }

    /// Current snapshot for one product, if any.
    pub async fn current(&self, product_number: &str) -> Result<Option<SnapshotRecord>, HistoryError> {
        let row = ProductHistory::find()
            .filter(product_history::Column::ProductNumber.eq(product_number))
            .filter(product_history::Column::IsCurrent.eq(true))
            .one(&*self.connection)
            .await?;
        Ok(row.map(to_record))
    }

    /// Snapshot for one product at an exact file date.
    pub async fn at_date(
        &self,
        product_number: &str,
        file_date: NaiveDate,
    ) -> Result<SnapshotRecord, HistoryError> {
        let row = ProductHistory::find()
            .filter(product_history::Column::ProductNumber.eq(product_number))
            .filter(product_history::Column::FileDate.eq(file_date))
            .one(&*self.connection)
            .await?;
        row.map(to_record).ok_or(HistoryError::SnapshotNotFound {
            entity: product_number.to_string(),
            file_date,
        })
    }

    /// Full snapshot history for one product, oldest first.
    pub async fn history(&self, product_number: &str) -> Result<Vec<SnapshotRecord>, HistoryError> {
        let rows = ProductHistory::find()
            .filter(product_history::Column::ProductNumber.eq(product_number))
            .order_by_asc(product_history::Column::FileDate)
            .all(&*self.connection)
            .await?;
        Ok(rows.into_iter().map(to_record).collect())
    }

    /// The derived latest-projection row for one product, if any.
    pub async fn latest_projection(
        &self,
        product_number: &str,
    ) -> Result<Option<product_latest::Model>, HistoryError> {
        let row = ProductLatest::find_by_id(product_number)
            .one(&*self.connection)
            .await?;
        Ok(row)
    }

    /// Field-level diff between two snapshots of the same product.
    ///
    /// Volatile fields are stripped before comparison so churn-only columns
    /// never show up as changes. Cross-product diffing is not expressible
    /// here: both dates resolve against the same product number.
    pub async fn diff(
        &self,
        product_number: &str,
        from_date: NaiveDate,
        to_date: NaiveDate,
        volatile_fields: &[String],
    ) -> Result<SnapshotDiff, HistoryError> {
        let from = self.at_date(product_number, from_date).await?;
        let to = self.at_date(product_number, to_date).await?;
        let from_payload = strip_volatile(&from.payload, volatile_fields);
        let to_payload = strip_volatile(&to.payload, volatile_fields);
        Ok(diff_payloads(&from_payload, &to_payload))
    }
}

fn to_record(model: product_history::Model) -> SnapshotRecord {
    SnapshotRecord {
        id: model.id,
        product_number: model.product_number,
        alternate_number: model.alternate_number,
        raw_file_id: model.raw_file_id,
        file_date: model.file_date,
        source_modified_at: model.source_modified_at,
        payload: model.payload,
        content_hash: model.content_hash,
        is_current: model.is_current,
        imported_at: model.imported_at,
    }
}

/// Heuristic for constraint violations across backends; SeaORM does not
/// expose a typed unique-violation error.
fn is_conflict(err: &DbErr) -> bool {
    let message = err.to_string().to_ascii_lowercase();
    message.contains("unique") || message.contains("duplicate key")
}
