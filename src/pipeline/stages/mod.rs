//! Stage handlers.
//!
//! Each handler does exactly one kind of work over one item and reports a
//! `StageStatus`; moving the item between state directories is the
//! runner's job, not the handler's.

use async_trait::async_trait;

use crate::errors::PipelineError;
use crate::models::{StageStatus, WorkItem};
use crate::pipeline::StageSpec;

pub mod bgremove;
pub mod deploy;
pub mod format_generate;
pub mod format_prepare;
pub mod rename;

pub use bgremove::BgRemoveStage;
pub use deploy::DeployStage;
pub use format_generate::FormatGenerateStage;
pub use format_prepare::FormatPrepareStage;
pub use rename::RenameStage;

#[async_trait]
pub trait StageHandler: Send + Sync {
    fn spec(&self) -> &StageSpec;

    /// Perform this stage's work over one item.
    ///
    /// Errors are item-scoped: the runner audits them and parks the item
    /// in `errors`, the run continues.
    async fn process(&self, item: &WorkItem) -> Result<StageStatus, PipelineError>;

    /// Remove any intermediate files this stage may have left beside the
    /// item. Runs after a failure or timeout, before the item is parked.
    async fn cleanup(&self, _item: &WorkItem) {}
}
