//! Stage directory state machine.
//!
//! An item's state is the directory it sits in; transitions are atomic
//! renames along a fixed set of edges. Every state may fail into `errors`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::utils::filenames;

/// The stage directories under the media base.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum StageDir {
    Inbox,
    Processing,
    Review,
    Products,
    Production,
    Archive,
    Errors,
}

impl StageDir {
    /// Whether a move along this edge is defined.
    pub fn can_transition(self, to: StageDir) -> bool {
        matches!(
            (self, to),
            (StageDir::Inbox, StageDir::Processing)
                | (StageDir::Processing, StageDir::Review)
                | (StageDir::Review, StageDir::Products)
                | (StageDir::Products, StageDir::Products)
                | (StageDir::Products, StageDir::Production)
                | (StageDir::Production, StageDir::Archive)
                | (_, StageDir::Errors)
        )
    }
}

/// Filesystem side of the state machine: one base directory, one
/// subdirectory per state.
#[derive(Debug, Clone)]
pub struct StateMachine {
    base: PathBuf,
    overwrite: bool,
}

impl StateMachine {
    pub fn new(base: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            base: base.into(),
            overwrite,
        }
    }

    pub fn dir(&self, state: StageDir) -> PathBuf {
        self.base.join(state.as_ref())
    }

    /// Create every stage directory that does not exist yet.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for state in StageDir::iter() {
            tokio::fs::create_dir_all(self.dir(state)).await?;
        }
        Ok(())
    }

    /// Move an item along a defined edge, optionally into a subdirectory
    /// below the target state. The move is a single rename; an existing
    /// same-named destination is a conflict unless overwriting is enabled.
    pub async fn move_item(
        &self,
        item_path: &Path,
        from: StageDir,
        to: StageDir,
        subdir: Option<&Path>,
    ) -> Result<PathBuf, PipelineError> {
        if !from.can_transition(to) {
            return Err(PipelineError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let file_name = item_path
            .file_name()
            .ok_or_else(|| PipelineError::InvalidItem {
                item: item_path.display().to_string(),
                message: "path has no file name".to_string(),
            })?;

        let mut target_dir = self.dir(to);
        if let Some(subdir) = subdir {
            target_dir = target_dir.join(subdir);
        }
        tokio::fs::create_dir_all(&target_dir).await?;

        let destination = target_dir.join(file_name);
        if !self.overwrite && tokio::fs::try_exists(&destination).await? {
            return Err(PipelineError::DestinationConflict { destination });
        }

        tokio::fs::rename(item_path, &destination).await?;
        debug!(from = %item_path.display(), to = %destination.display(), "Moved item");
        Ok(destination)
    }

    /// Move a failed item into `errors`, prefixed with a timestamp so
    /// repeated failures of the same item never collide.
    pub async fn move_to_errors(&self, item_path: &Path) -> Result<PathBuf, PipelineError> {
        let file_name = item_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let stamped = format!("{}_{}", Utc::now().format("%Y%m%dT%H%M%S%3f"), file_name);

        let errors_dir = self.dir(StageDir::Errors);
        tokio::fs::create_dir_all(&errors_dir).await?;
        let destination = errors_dir.join(stamped);
        tokio::fs::rename(item_path, &destination).await?;
        warn!(item = %item_path.display(), to = %destination.display(), "Item moved to errors");
        Ok(destination)
    }

    /// Discover the items currently sitting in a state directory,
    /// restricted to supported image files, sorted by name.
    ///
    /// `products` nests items under `<product>/source/`; every other state
    /// is a flat directory.
    pub async fn discover(&self, state: StageDir) -> std::io::Result<Vec<PathBuf>> {
        let root = self.dir(state);
        if !tokio::fs::try_exists(&root).await? {
            return Ok(Vec::new());
        }

        let mut found = match state {
            StageDir::Products => {
                let mut items = Vec::new();
                let mut products = tokio::fs::read_dir(&root).await?;
                while let Some(entry) = products.next_entry().await? {
                    let source_dir = entry.path().join("source");
                    if !tokio::fs::try_exists(&source_dir).await? {
                        continue;
                    }
                    items.extend(Self::flat_scan(&source_dir).await?);
                }
                items
            }
            _ => Self::flat_scan(&root).await?,
        };

        found.sort();
        Ok(found)
    }

    async fn flat_scan(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut items = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && filenames::is_image_file(&path) {
                items.push(path);
            }
        }
        Ok(items)
    }

    /// Directory for archived originals: `archive/YYYY-MM/<product>/`.
    pub fn archive_dir(&self, product_number: &str, when: DateTime<Utc>) -> PathBuf {
        self.dir(StageDir::Archive)
            .join(when.format("%Y-%m").to_string())
            .join(product_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn machine(overwrite: bool) -> (TempDir, StateMachine) {
        let tmp = TempDir::new().unwrap();
        let machine = StateMachine::new(tmp.path(), overwrite);
        (tmp, machine)
    }

    #[tokio::test]
    async fn items_move_along_defined_edges() {
        let (_tmp, machine) = machine(false);
        machine.ensure_dirs().await.unwrap();

        let item = machine.dir(StageDir::Inbox).join("J0801234.jpg");
        tokio::fs::write(&item, b"img").await.unwrap();

        let moved = machine
            .move_item(&item, StageDir::Inbox, StageDir::Processing, None)
            .await
            .unwrap();
        assert_eq!(moved, machine.dir(StageDir::Processing).join("J0801234.jpg"));
        assert!(!item.exists());
        assert!(moved.exists());
    }

    #[tokio::test]
    async fn undefined_edges_are_rejected_before_touching_the_filesystem() {
        let (_tmp, machine) = machine(false);
        machine.ensure_dirs().await.unwrap();

        let item = machine.dir(StageDir::Inbox).join("J0801234.jpg");
        tokio::fs::write(&item, b"img").await.unwrap();

        let err = machine
            .move_item(&item, StageDir::Inbox, StageDir::Production, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::IllegalTransition { .. }));
        assert!(item.exists());
    }

    #[tokio::test]
    async fn destination_conflicts_are_refused_unless_overwriting() {
        let (_tmp, machine) = machine(false);
        machine.ensure_dirs().await.unwrap();

        let item = machine.dir(StageDir::Inbox).join("J0801234.jpg");
        tokio::fs::write(&item, b"new").await.unwrap();
        let blocker = machine.dir(StageDir::Processing).join("J0801234.jpg");
        tokio::fs::write(&blocker, b"old").await.unwrap();

        let err = machine
            .move_item(&item, StageDir::Inbox, StageDir::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DestinationConflict { .. }));

        let (_tmp2, permissive) = self::machine(true);
        permissive.ensure_dirs().await.unwrap();
        let item = permissive.dir(StageDir::Inbox).join("J0801234.jpg");
        tokio::fs::write(&item, b"new").await.unwrap();
        let blocker = permissive.dir(StageDir::Processing).join("J0801234.jpg");
        tokio::fs::write(&blocker, b"old").await.unwrap();
        let moved = permissive
            .move_item(&item, StageDir::Inbox, StageDir::Processing, None)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&moved).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn discovery_filters_non_images_and_scans_product_sources() {
        let (_tmp, machine) = machine(false);
        machine.ensure_dirs().await.unwrap();

        let inbox = machine.dir(StageDir::Inbox);
        tokio::fs::write(inbox.join("J0801234.jpg"), b"img").await.unwrap();
        tokio::fs::write(inbox.join("notes.txt"), b"txt").await.unwrap();

        let found = machine.discover(StageDir::Inbox).await.unwrap();
        assert_eq!(found, vec![inbox.join("J0801234.jpg")]);

        let source = machine.dir(StageDir::Products).join("A52007").join("source");
        tokio::fs::create_dir_all(&source).await.unwrap();
        tokio::fs::write(source.join("A52007.png"), b"img").await.unwrap();

        let found = machine.discover(StageDir::Products).await.unwrap();
        assert_eq!(found, vec![source.join("A52007.png")]);
    }

    #[tokio::test]
    async fn error_moves_are_timestamped() {
        let (_tmp, machine) = machine(false);
        machine.ensure_dirs().await.unwrap();

        let item = machine.dir(StageDir::Processing).join("J0801234.jpg");
        tokio::fs::write(&item, b"img").await.unwrap();

        let parked = machine.move_to_errors(&item).await.unwrap();
        let name = parked.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_J0801234.jpg"));
        assert!(parked.starts_with(machine.dir(StageDir::Errors)));
    }
}
