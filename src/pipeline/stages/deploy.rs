//! Deploy stage: copy a product's generated formats into `production/`
//! and record the batch in `production_sync`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::database::repositories::MediaActivityRepository;
use crate::errors::PipelineError;
use crate::models::{StageOutput, StageStatus, WorkItem};
use crate::pipeline::StageSpec;
use crate::pipeline::state_machine::{StageDir, StateMachine};

use super::StageHandler;

pub struct DeployStage {
    spec: StageSpec,
    state: StateMachine,
    media: MediaActivityRepository,
}

impl DeployStage {
    pub fn new(spec: StageSpec, state: StateMachine, media: MediaActivityRepository) -> Self {
        Self { spec, state, media }
    }

    /// Collect every file below a directory, recursively.
    async fn collect_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl StageHandler for DeployStage {
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
        let product_dir = item
            .path
            .parent()
            .and_then(|p| p.parent())
            .ok_or_else(|| PipelineError::InvalidItem {
                item: file_name.clone(),
                message: "item is not inside a product source directory".to_string(),
            })?;

        let formats_dir = product_dir.join("formats");
        if !tokio::fs::try_exists(&formats_dir).await? {
            return Err(PipelineError::stage(
                self.spec.name,
                format!("no generated formats for {product_number}"),
            ));
        }

        let artifacts = Self::collect_files(&formats_dir).await?;
        if artifacts.is_empty() {
            return Err(PipelineError::stage(
                self.spec.name,
                format!("no generated formats for {product_number}"),
            ));
        }

        let target = self.state.dir(StageDir::Production).join(product_number);
        tokio::fs::create_dir_all(&target).await?;

        let mut total_bytes = 0i64;
        for artifact in &artifacts {
            let name = artifact
                .file_name()
                .ok_or_else(|| PipelineError::stage(self.spec.name, "artifact has no file name"))?;
            total_bytes += tokio::fs::copy(artifact, target.join(name)).await? as i64;
        }

        if let Err(err) = self
            .media
            .record_sync(product_number, artifacts.len() as i32, total_bytes)
            .await
        {
            warn!(product = %product_number, "Failed to record production sync: {err:#}");
        }

        Ok(StageStatus::Completed(StageOutput {
            target_subdir: Some(PathBuf::from(product_number)),
            detail: Some(format!(
                "deployed {} artifacts ({total_bytes} bytes)",
                artifacts.len()
            )),
            ..Default::default()
        }))
    }
}
