//! Snapshot ingestion: raw source dumps into the version store.
//!
//! One batch per dump file. Rows are archived verbatim, validated, hashed,
//! and applied against the history store; the latest projection is
//! refreshed only for entities the batch actually touched. Malformed rows
//! fail individually; infrastructure errors abort the batch.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::database::repositories::history::SnapshotInput;
use crate::database::repositories::{AuditRepository, HistoryRepository, RawFileRepository};
use crate::errors::IngestError;
use crate::models::{AuditEntry, IngestStats, RawFileDescriptor, SnapshotDecision};

pub mod diff;
pub mod hashing;

pub struct SnapshotIngestor {
    config: IngestConfig,
    raw_files: RawFileRepository,
    history: HistoryRepository,
    audit: AuditRepository,
}

impl SnapshotIngestor {
    pub fn new(
        config: IngestConfig,
        raw_files: RawFileRepository,
        history: HistoryRepository,
        audit: AuditRepository,
    ) -> Self {
        Self {
            config,
            raw_files,
            history,
            audit,
        }
    }

    /// Ingest one dump file's rows as a batch.
    pub async fn ingest(
        &self,
        descriptor: &RawFileDescriptor,
        rows: &[JsonValue],
    ) -> Result<IngestStats, IngestError> {
        let started = Instant::now();

        if self.raw_files.is_ingested(&descriptor.file_name).await? {
            return Err(IngestError::DuplicateFile {
                file: descriptor.file_name.clone(),
            });
        }

        info!(
            file = %descriptor.file_name,
            file_date = %descriptor.file_date,
            rows = rows.len(),
            "Starting snapshot ingest"
        );

        let raw_file = self.raw_files.create(descriptor).await?;
        self.raw_files.insert_rows(raw_file.id, rows).await?;

        let mut stats = IngestStats {
            file_name: descriptor.file_name.clone(),
            ..Default::default()
        };
        let mut touched: BTreeSet<String> = BTreeSet::new();

        for (index, row) in rows.iter().enumerate() {
            stats.total_rows += 1;

            let input = match self.validate_row(index, row, raw_file.id, descriptor) {
                Ok(input) => input,
                Err(IngestError::Validation { row, message }) => {
                    warn!(file = %descriptor.file_name, row, %message, "Row rejected");
                    stats.failed += 1;
                    continue;
                }
                Err(other) => return Err(other),
            };

            let entity = input.product_number.clone();
            let decision = match self.history.apply_snapshot(&input).await {
                Ok(decision) => decision,
                // Losing the pointer race twice is row-scoped bad luck, not
                // a reason to abandon the rest of the dump.
                Err(IngestError::ConcurrentModification { entity }) => {
                    warn!(file = %descriptor.file_name, row = index, %entity, "Row lost the pointer race");
                    stats.failed += 1;
                    continue;
                }
                Err(other) => return Err(other),
            };
            match decision {
                SnapshotDecision::Inserted => {
                    stats.inserted += 1;
                    touched.insert(entity.clone());
                    self.record_decision(&entity, "snapshot_created", descriptor)
                        .await;
                }
                SnapshotDecision::Unchanged => {
                    stats.unchanged += 1;
                }
                SnapshotDecision::Flipped => {
                    stats.flipped += 1;
                    touched.insert(entity.clone());
                    self.record_decision(&entity, "snapshot_updated", descriptor)
                        .await;
                }
            }
        }

        for entity in &touched {
            self.history
                .refresh_latest(entity, &self.config.volatile_fields)
                .await?;
        }

        self.raw_files
            .set_row_count(raw_file.id, stats.total_rows as i32)
            .await?;
        self.raw_files.mark_ingested(descriptor).await?;

        stats.duration_ms = started.elapsed().as_millis() as u64;
        info!(file = %descriptor.file_name, "Snapshot ingest finished: {stats}");
        Ok(stats)
    }

    /// Validate one row and build the candidate snapshot.
    fn validate_row(
        &self,
        index: usize,
        row: &JsonValue,
        raw_file_id: i64,
        descriptor: &RawFileDescriptor,
    ) -> Result<SnapshotInput, IngestError> {
        let map = row.as_object().ok_or_else(|| IngestError::Validation {
            row: index,
            message: "row is not a JSON object".to_string(),
        })?;

        let product_number = map
            .get(&self.config.entity_field)
            .and_then(field_as_string)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| IngestError::Validation {
                row: index,
                message: format!("missing or empty '{}' field", self.config.entity_field),
            })?;

        let alternate_number = map
            .get(&self.config.alternate_field)
            .and_then(field_as_string)
            .filter(|n| !n.is_empty());

        let source_modified_at = map
            .get(&self.config.modified_field)
            .and_then(JsonValue::as_str)
            .and_then(parse_source_timestamp);

        Ok(SnapshotInput {
            product_number,
            alternate_number,
            raw_file_id,
            file_date: descriptor.file_date,
            source_modified_at,
            payload: row.clone(),
            content_hash: hashing::content_hash(row),
        })
    }

    /// Audit writes here are best-effort; a failed audit insert must not
    /// fail the row it describes.
    async fn record_decision(&self, entity: &str, action: &str, descriptor: &RawFileDescriptor) {
        let entry = AuditEntry::new(entity, action)
            .with_actor("ingest")
            .with_source_file(&descriptor.file_name);
        if let Err(err) = self.audit.record(entry).await {
            warn!(%entity, %action, "Failed to record audit entry: {err:#}");
        }
    }
}

/// Entity numbers arrive as strings or bare numbers depending on the
/// export; both are accepted.
fn field_as_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_source_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    debug!(%raw, "Unparseable source modification timestamp");
    None
}

/// Load rows from a dump file: CSV with a header row, one JSON array, or
/// one JSON object per line (NDJSON).
///
/// `required_headers` applies to CSV dumps only; a dump missing one of
/// them is rejected before anything touches the database.
pub fn load_rows(path: &Path, required_headers: &[String]) -> anyhow::Result<Vec<JsonValue>> {
    use anyhow::Context;

    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
    {
        return load_csv_rows(path, required_headers);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dump file: {}", path.display()))?;
    let trimmed = contents.trim_start();

    if trimmed.starts_with('[') {
        let rows: Vec<JsonValue> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse dump file as JSON array: {}", path.display()))?;
        return Ok(rows);
    }

    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(number, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("failed to parse line {} of {}", number + 1, path.display()))
        })
        .collect()
}

/// CSV dumps become string-valued JSON objects keyed by their headers,
/// which is exactly how the rows are archived and hashed. Headers are
/// trimmed and lowercased before the required set is checked.
fn load_csv_rows(path: &Path, required_headers: &[String]) -> anyhow::Result<Vec<JsonValue>> {
    use anyhow::Context;

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open CSV dump: {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("failed to read CSV headers of {}", path.display()))?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    let missing: Vec<&str> = required_headers
        .iter()
        .filter(|required| !headers.contains(required))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(IngestError::Validation {
            row: 0,
            message: format!("missing required CSV headers: {}", missing.join(", ")),
        }
        .into());
    }

    let mut rows = Vec::new();
    for (number, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("failed to parse record {} of {}", number + 1, path.display()))?;
        let object: serde_json::Map<String, JsonValue> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|field| JsonValue::String(field.to_string())))
            .collect();
        rows.push(JsonValue::Object(object));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_numbers_accept_strings_and_bare_numbers() {
        assert_eq!(field_as_string(&json!("  10045 ")), Some("10045".to_string()));
        assert_eq!(field_as_string(&json!(10045)), Some("10045".to_string()));
        assert_eq!(field_as_string(&json!(["10045"])), None);
    }

    #[test]
    fn source_timestamps_parse_common_export_formats() {
        assert!(parse_source_timestamp("2026-03-01T08:30:00Z").is_some());
        assert!(parse_source_timestamp("2026-03-01 08:30:00").is_some());
        assert!(parse_source_timestamp("last tuesday").is_none());
    }

    #[test]
    fn csv_dumps_load_as_string_valued_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("2026-08-14_Filemaker-Dump.csv");
        std::fs::write(
            &path,
            "Number,Description\n10045,Hinge\nA52007,\"Bracket, large\"\n",
        )
        .unwrap();

        let rows = load_rows(&path, &["number".to_string()]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!({"number": "10045", "description": "Hinge"}));
        assert_eq!(rows[1]["description"], "Bracket, large");
    }

    #[test]
    fn csv_dumps_missing_required_headers_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("2026-08-14_Filemaker-Dump.csv");
        std::fs::write(&path, "Description\nHinge\n").unwrap();

        let err = load_rows(&path, &["number".to_string()]).unwrap_err();
        let err = err.downcast::<IngestError>().unwrap();
        assert!(matches!(err, IngestError::Validation { row: 0, .. }));
    }
}
