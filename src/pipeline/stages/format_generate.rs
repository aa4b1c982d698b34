//! Format-generation stage: derive the configured output formats from an
//! approved source image.
//!
//! The item stays in place; artifacts land under the product's
//! `formats/<category>/` directory and are recorded in `format_history`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::FormatSpecConfig;
use crate::database::repositories::MediaActivityRepository;
use crate::errors::PipelineError;
use crate::models::{StageOutput, StageStatus, WorkItem};
use crate::pipeline::StageSpec;
use crate::services::ToolRunner;

use super::StageHandler;

/// One output format together with the runner that produces it.
pub struct FormatPlan {
    pub format: FormatSpecConfig,
    pub runner: Arc<dyn ToolRunner>,
}

pub struct FormatGenerateStage {
    spec: StageSpec,
    plans: Vec<FormatPlan>,
    media: MediaActivityRepository,
}

impl FormatGenerateStage {
    pub fn new(spec: StageSpec, plans: Vec<FormatPlan>, media: MediaActivityRepository) -> Self {
        Self { spec, plans, media }
    }
}

#[async_trait]
impl StageHandler for FormatGenerateStage {
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
        // Items sit at products/<product>/source/<file>.
        let product_dir = item
            .path
            .parent()
            .and_then(|p| p.parent())
            .ok_or_else(|| PipelineError::InvalidItem {
                item: file_name.clone(),
                message: "item is not inside a product source directory".to_string(),
            })?;

        let stem = format!("{product_number}{}", item.view_suffix);
        let mut generated = 0usize;

        for plan in &self.plans {
            let format = &plan.format;
            let out_dir = product_dir.join("formats").join(&format.category);
            let out_path = out_dir.join(format!("{stem}_{}.{}", format.name, format.extension));

            if tokio::fs::try_exists(&out_path).await? {
                debug!(format = %format.name, path = %out_path.display(), "Format already present");
                continue;
            }

            tokio::fs::create_dir_all(&out_dir).await?;
            plan.runner
                .run(&item.path, &out_path, self.spec.timeout)
                .await?;
            generated += 1;

            let size = tokio::fs::metadata(&out_path).await.map(|m| m.len() as i64).ok();
            if let Err(err) = self
                .media
                .record_format(product_number, &format.name, &out_path.to_string_lossy(), size)
                .await
            {
                warn!(product = %product_number, format = %format.name, "Failed to record format: {err:#}");
            }
        }

        if generated == 0 {
            return Ok(StageStatus::Skipped("all formats up to date".to_string()));
        }

        Ok(StageStatus::Completed(StageOutput {
            detail: Some(format!("generated {generated} of {} formats", self.plans.len())),
            ..Default::default()
        }))
    }
}
