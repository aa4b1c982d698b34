//! Error type definitions for the partflow pipelines
//!
//! Two failure domains exist: the media stage pipeline (filesystem items
//! moving between stage directories) and the snapshot ingestion pipeline
//! (rows moving into the version store). Each gets its own `thiserror`
//! enum so item-level and row-level failures can be classified and
//! persisted to the audit trail without string matching.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while driving an item through the media stage pipeline.
///
/// All variants are item-scoped: they fail the item, never the run.
/// Run-level (infrastructure) failures are surfaced as `anyhow::Error`
/// at the runner seam instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A directory move was requested along an edge the state machine
    /// does not define.
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// A same-named item already exists at the destination and
    /// overwriting was not allowed.
    #[error("destination already exists: {destination}")]
    DestinationConflict { destination: PathBuf },

    /// A stage exceeded its wall-clock budget.
    #[error("stage '{stage}' timed out after {timeout:?}")]
    Timeout { stage: String, timeout: Duration },

    /// An external tool exited non-zero or produced no usable output.
    #[error("external tool '{tool}' failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Filesystem operation failed (rename, metadata, copy).
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// The item's filename does not yield a product number or contains
    /// characters the pipeline refuses to carry forward.
    #[error("invalid item '{item}': {message}")]
    InvalidItem { item: String, message: String },

    /// Stage-specific failure that does not fit a more precise variant.
    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },
}

impl PipelineError {
    /// Stable machine-readable kind, persisted into audit entry context.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::IllegalTransition { .. } => "illegal_transition",
            PipelineError::DestinationConflict { .. } => "destination_conflict",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::ExternalTool { .. } => "external_tool",
            PipelineError::Io(_) => "io",
            PipelineError::InvalidItem { .. } => "invalid_item",
            PipelineError::Stage { .. } => "stage",
        }
    }

    pub fn stage<S: Into<String>, M: Into<String>>(stage: S, message: M) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn external_tool<T: Into<String>, M: Into<String>>(tool: T, message: M) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while ingesting a snapshot file into the version store.
///
/// `Validation` is row-scoped (row skipped, batch continues); the rest
/// abort the batch.
#[derive(Error, Debug)]
pub enum IngestError {
    /// A row could not be validated (not an object, missing entity
    /// number, unparseable payload).
    #[error("row {row} rejected: {message}")]
    Validation { row: usize, message: String },

    /// The current-pointer flip lost a race with a concurrent ingest of
    /// the same entity and the retry also failed.
    #[error("concurrent modification of entity {entity}")]
    ConcurrentModification { entity: String },

    /// The file was already recorded in the processed-file ledger.
    #[error("file already ingested: {file}")]
    DuplicateFile { file: String },

    /// Database errors from SeaORM.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Errors raised by history/diff read operations.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// No snapshot exists for the entity at the requested file date.
    #[error("no snapshot for entity {entity} at {file_date}")]
    SnapshotNotFound {
        entity: String,
        file_date: chrono::NaiveDate,
    },

    /// Database errors from SeaORM.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}
