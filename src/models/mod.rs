//! Domain models shared across the pipelines
//!
//! These are plain domain structs, deliberately separate from the SeaORM
//! entities in `crate::entities`: repositories translate between the two at
//! the database boundary.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::utils::filenames;

/// One filesystem item moving through the media pipeline.
///
/// Identity is the product number derived from the filename; state is the
/// directory the file currently sits in. Nothing here is persisted directly,
/// only through audit entries.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Current on-disk location.
    pub path: PathBuf,
    /// Filename the item arrived with, kept for audit context.
    pub source_name: String,
    /// Normalized product number, once the filename yields one.
    pub product_number: Option<String>,
    /// View suffix (`_1`, `_2`, ...) when the filename carries one.
    pub view_suffix: String,
}

impl WorkItem {
    /// Build an item from a discovered path. The product number may be
    /// absent at this point; the rename stage rejects such items.
    pub fn from_path(path: PathBuf) -> Self {
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let product_number = filenames::extract_product_number(&source_name)
            .map(|raw| filenames::normalize_product_number(&raw));
        let view_suffix = filenames::view_suffix(&source_name);
        Self {
            path,
            source_name,
            product_number,
            view_suffix,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// What a stage handler reports back on success.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// New location of the item when the handler renamed or rewrote it
    /// inside the source directory.
    pub path: Option<PathBuf>,
    /// Subdirectory below the target state directory the item should be
    /// moved into (e.g. `<product>/source`).
    pub target_subdir: Option<PathBuf>,
    /// Free-text detail for the audit entry.
    pub detail: Option<String>,
}

/// Handler-level result: real work done, or a reasoned no-op.
#[derive(Debug)]
pub enum StageStatus {
    Completed(StageOutput),
    Skipped(String),
}

/// Executor-level outcome for one stage over one item.
#[derive(Debug)]
pub enum StageOutcome {
    Success(StageOutput),
    Skipped(String),
    Failed(crate::errors::PipelineError),
}

/// Aggregate statistics for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
    pub duration_ms: u64,
}

impl RunStats {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            started_at: Utc::now(),
            total: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            duration_ms: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.total += 1;
        self.successful += 1;
    }

    pub fn record_failure(&mut self) {
        self.total += 1;
        self.failed += 1;
    }

    pub fn record_skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed: {} | success: {} | failed: {} | skipped: {} | time: {}ms",
            self.total, self.successful, self.failed, self.skipped, self.duration_ms
        )
    }
}

/// One immutable audit fact. Append-only; never mutated or deleted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub product_number: String,
    pub actor: String,
    pub action: String,
    pub details: Option<String>,
    pub source_file: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub context: Option<JsonValue>,
}

impl AuditEntry {
    pub fn new(product_number: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            product_number: product_number.into(),
            actor: "system".to_string(),
            action: action.into(),
            details: None,
            source_file: None,
            execution_time_ms: None,
            context: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    pub fn with_execution_time(mut self, ms: i64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    pub fn with_context(mut self, context: JsonValue) -> Self {
        self.context = Some(context);
        self
    }
}

/// Descriptor for one raw source dump being ingested.
#[derive(Debug, Clone)]
pub struct RawFileDescriptor {
    pub file_name: String,
    pub file_date: NaiveDate,
}

/// Domain view of one `product_history` row.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRecord {
    pub id: i64,
    pub product_number: String,
    pub alternate_number: Option<String>,
    pub raw_file_id: i64,
    pub file_date: NaiveDate,
    pub source_modified_at: Option<DateTime<Utc>>,
    pub payload: JsonValue,
    pub content_hash: String,
    pub is_current: bool,
    pub imported_at: DateTime<Utc>,
}

/// Per-field delta between two snapshots of the same entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: Option<JsonValue>,
    pub to: Option<JsonValue>,
}

/// Field-name-keyed diff between two snapshot payloads.
pub type SnapshotDiff = BTreeMap<String, FieldChange>;

/// What the version store decided for one ingested row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotDecision {
    /// First snapshot for the entity, inserted as current.
    Inserted,
    /// Hash matched the current snapshot; nothing written.
    Unchanged,
    /// Hash differed; new snapshot inserted and the pointer flipped.
    Flipped,
}

/// Aggregate statistics for one ingest batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub file_name: String,
    pub total_rows: u64,
    pub inserted: u64,
    pub unchanged: u64,
    pub flipped: u64,
    pub failed: u64,
    pub duration_ms: u64,
}

impl std::fmt::Display for IngestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: rows: {} | new: {} | unchanged: {} | changed: {} | failed: {} | time: {}ms",
            self.file_name,
            self.total_rows,
            self.inserted,
            self.unchanged,
            self.flipped,
            self.failed,
            self.duration_ms
        )
    }
}
