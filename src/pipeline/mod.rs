//! Media stage pipeline.
//!
//! Items are image files moving through a fixed sequence of stage
//! directories. Stage order within an item is strict; across items the
//! runner processes an unordered pool bounded by per-stage semaphores.

use std::time::Duration;

use crate::config::StageLimit;
use crate::pipeline::state_machine::StageDir;

pub mod executor;
pub mod runner;
pub mod stages;
pub mod state_machine;

pub use runner::PipelineRunner;

/// Static description of one stage: where its items come from, where they
/// go on success, and the resource limits it runs under.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub name: &'static str,
    pub source: StageDir,
    pub target: StageDir,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl StageSpec {
    pub fn new(
        name: &'static str,
        source: StageDir,
        target: StageDir,
        limit: &StageLimit,
    ) -> Self {
        Self {
            name,
            source,
            target,
            concurrency: limit.concurrency,
            timeout: limit.timeout,
        }
    }

    /// Stages whose source and target coincide rewrite items in place; the
    /// runner performs no directory move for them.
    pub fn moves_item(&self) -> bool {
        self.source != self.target
    }
}
