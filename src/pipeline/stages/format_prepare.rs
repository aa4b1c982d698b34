//! Format-prepare stage: route an approved image into its product's
//! `source/` directory under `products/`.
//!
//! Pure routing; the runner performs the actual move using the target
//! subdirectory this stage reports.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::models::{StageOutput, StageStatus, WorkItem};
use crate::pipeline::StageSpec;

use super::StageHandler;

pub struct FormatPrepareStage {
    spec: StageSpec,
}

impl FormatPrepareStage {
    pub fn new(spec: StageSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl StageHandler for FormatPrepareStage {
    fn spec(&self) -> &StageSpec {
        &self.spec
    }

    async fn process(&self, item: &WorkItem) -> Result<StageStatus, PipelineError> {
        let product_number =
            item.product_number
                .as_deref()
                .ok_or_else(|| PipelineError::InvalidItem {
                    item: item.file_name(),
                    message: "filename yields no product number".to_string(),
                })?;

        Ok(StageStatus::Completed(StageOutput {
            target_subdir: Some(PathBuf::from(product_number).join("source")),
            detail: Some(format!("routed to {product_number}/source")),
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

    #[tokio::test]
    async fn items_are_routed_into_their_product_source_directory() {
        let limit = StageLimit {
            concurrency: 1,
            timeout: Duration::from_secs(5),
        };
        let stage = FormatPrepareStage::new(StageSpec::new(
            "format_prepare",
            StageDir::Review,
            StageDir::Products,
            &limit,
        ));

        let item = WorkItem::from_path(PathBuf::from("/base/review/A52007_2.png"));
        let status = stage.process(&item).await.unwrap();
        let StageStatus::Completed(output) = status else {
            panic!("expected completion");
        };
        assert_eq!(
            output.target_subdir,
            Some(PathBuf::from("A52007").join("source"))
        );
    }
}
