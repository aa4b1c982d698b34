//! Rename stage: enforce the canonical `NUMBER[_VIEW].ext` filename.

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::models::{StageOutput, StageStatus, WorkItem};
use crate::pipeline::StageSpec;
use crate::utils::filenames;

use super::StageHandler;

pub struct RenameStage {
    spec: StageSpec,
    overwrite: bool,
}

impl RenameStage {
    pub fn new(spec: StageSpec, overwrite: bool) -> Self {
        Self { spec, overwrite }
    }
}

#[async_trait]
impl StageHandler for RenameStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    async fn process(&self, item: &WorkItem) -> Result<StageStatus, PipelineError> {
        let file_name = item.file_name();

        if filenames::has_invalid_chars(&file_name) {
            return Err(PipelineError::InvalidItem {
                item: file_name,
                message: "filename contains forbidden characters".to_string(),
            });
        }

        let Some(product_number) = item.product_number.as_deref() else {
            return Err(PipelineError::InvalidItem {
                item: file_name,
                message: "filename yields no product number".to_string(),
            });
        };

        let extension = item
            .path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let canonical = format!("{product_number}{}.{extension}", item.view_suffix);

        if file_name == canonical {
            return Ok(StageStatus::Completed(StageOutput {
                detail: Some("filename already canonical".to_string()),
                ..Default::default()
            }));
        }

        let parent = item.path.parent().ok_or_else(|| PipelineError::InvalidItem {
            item: file_name.clone(),
            message: "item has no parent directory".to_string(),
        })?;
        let renamed = parent.join(&canonical);

        if !self.overwrite && tokio::fs::try_exists(&renamed).await? {
            return Err(PipelineError::DestinationConflict {
                destination: renamed,
            });
        }
        tokio::fs::rename(&item.path, &renamed).await?;

        Ok(StageStatus::Completed(StageOutput {
            path: Some(renamed),
            detail: Some(format!("renamed {file_name} -> {canonical}")),
            ..Default::default()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageLimit;
    use crate::pipeline::state_machine::StageDir;
    use std::time::Duration;
    use tempfile::TempDir;

    fn stage() -> RenameStage {
        let limit = StageLimit {
            concurrency: 1,
            timeout: Duration::from_secs(5),
        };
        RenameStage::new(
            StageSpec::new("rename", StageDir::Inbox, StageDir::Processing, &limit),
            false,
        )
    }

    #[tokio::test]
    async fn lowercase_messy_names_become_canonical() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("j080-1234_2.JPG");
        tokio::fs::write(&original, b"img").await.unwrap();

        let status = stage()
            .process(&WorkItem::from_path(original))
            .await
            .unwrap();
        let StageStatus::Completed(output) = status else {
            panic!("expected completion");
        };
        assert_eq!(output.path, Some(tmp.path().join("J080_1234_2.jpg")));
        assert!(output.path.unwrap().exists());
    }

    #[tokio::test]
    async fn canonical_names_complete_without_a_rename() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("J0801234_2.jpg");
        tokio::fs::write(&original, b"img").await.unwrap();

        let status = stage()
            .process(&WorkItem::from_path(original.clone()))
            .await
            .unwrap();
        let StageStatus::Completed(output) = status else {
            panic!("expected completion");
        };
        assert_eq!(output.path, None);
        assert!(original.exists());
    }

    #[tokio::test]
    async fn forbidden_characters_fail_the_item() {
        let tmp = TempDir::new().unwrap();
        let original = tmp.path().join("what?.png");
        tokio::fs::write(&original, b"img").await.unwrap();

        let err = stage()
            .process(&WorkItem::from_path(original))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_item");
    }
}
