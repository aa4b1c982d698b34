//! Background removal stage.
//!
//! Runs the configured cutout tool over the item, archives the untouched
//! original under `archive/YYYY-MM/<product>/`, and leaves a transparent
//! PNG in the item's place.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::errors::PipelineError;
use crate::models::{StageOutput, StageStatus, WorkItem};
use crate::pipeline::StageSpec;
use crate::pipeline::state_machine::StateMachine;
use crate::services::ToolRunner;

use super::StageHandler;

pub struct BgRemoveStage {
    spec: StageSpec,
    tool: Arc<dyn ToolRunner>,
    state: StateMachine,
}

impl BgRemoveStage {
    pub fn new(spec: StageSpec, tool: Arc<dyn ToolRunner>, state: StateMachine) -> Self {
        Self { spec, tool, state }
    }

    fn scratch_path(item: &WorkItem) -> Option<std::path::PathBuf> {
        let parent = item.path.parent()?;
        let stem = item.path.file_stem()?.to_string_lossy();
        Some(parent.join(format!("{stem}.nobg.png")))
    }
}

#[async_trait]
impl StageHandler for BgRemoveStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    async fn process(&self, item: &WorkItem) -> Result<StageStatus, PipelineError> {
        let file_name = item.file_name();
        let product_number =
            item.product_number
                .as_deref()
                .ok_or_else(|| PipelineError::InvalidItem {
                    item: file_name.clone(),
                    message: "filename yields no product number".to_string(),
                })?;
        let parent = item.path.parent().ok_or_else(|| PipelineError::InvalidItem {
            item: file_name.clone(),
            message: "item has no parent directory".to_string(),
        })?;
        let stem = item
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| product_number.to_string());

        // Written beside the original first so an input that is already a
        // PNG is never read and overwritten at once.
        let scratch = parent.join(format!("{stem}.nobg.png"));
        self.tool
            .run(&item.path, &scratch, self.spec.timeout)
            .await?;

        // Original is archived before anything destructive happens to it.
        let archive_dir = self.state.archive_dir(product_number, Utc::now());
        tokio::fs::create_dir_all(&archive_dir).await?;
        tokio::fs::copy(&item.path, archive_dir.join(&file_name)).await?;
        tokio::fs::remove_file(&item.path).await?;

        let cutout = parent.join(format!("{stem}.png"));
        tokio::fs::rename(&scratch, &cutout).await?;

        Ok(StageStatus::Completed(StageOutput {
            path: Some(cutout),
            detail: Some(format!("background removed, original archived as {file_name}")),
            ..Default::default()
        }))
    }

    /// A timed-out or failed cutout can leave the scratch file behind;
    /// remove it with the item so `processing` never accumulates partials.
    async fn cleanup(&self, item: &WorkItem) {
        let Some(scratch) = Self::scratch_path(item) else {
            return;
        };
        if tokio::fs::remove_file(&scratch).await.is_ok() {
            debug!(item = %item.source_name, "Removed leftover cutout scratch file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageLimit;
    use crate::pipeline::state_machine::StageDir;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FakeCutout;

    #[async_trait]
    impl ToolRunner for FakeCutout {
        fn name(&self) -> &str {
            "bgremove"
        }

        async fn run(
            &self,
            _input: &Path,
            output: &Path,
            _timeout: Duration,
        ) -> Result<(), PipelineError> {
            tokio::fs::write(output, b"cutout").await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn original_is_archived_and_replaced_by_a_png() {
        let tmp = TempDir::new().unwrap();
        let state = StateMachine::new(tmp.path(), false);
        state.ensure_dirs().await.unwrap();

        let original = state.dir(StageDir::Processing).join("J0801234.jpg");
        tokio::fs::write(&original, b"raw").await.unwrap();

        let limit = StageLimit {
            concurrency: 1,
            timeout: Duration::from_secs(5),
        };
        let stage = BgRemoveStage::new(
            StageSpec::new("bgremove", StageDir::Processing, StageDir::Review, &limit),
            Arc::new(FakeCutout),
            state.clone(),
        );

        let status = stage
            .process(&WorkItem::from_path(original.clone()))
            .await
            .unwrap();
        let StageStatus::Completed(output) = status else {
            panic!("expected completion");
        };

        let cutout = output.path.unwrap();
        assert_eq!(cutout, state.dir(StageDir::Processing).join("J0801234.png"));
        assert_eq!(tokio::fs::read(&cutout).await.unwrap(), b"cutout");
        assert!(!original.exists());

        let archived = state
            .archive_dir("J0801234", Utc::now())
            .join("J0801234.jpg");
        assert_eq!(tokio::fs::read(&archived).await.unwrap(), b"raw");
    }
}
