//! Stage execution under resource limits.
//!
//! One semaphore per stage name caps how many items run that stage at
//! once; one timeout per stage bounds wall-clock time. Both come from the
//! stage's `StageSpec`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::errors::PipelineError;
use crate::models::{StageOutcome, StageStatus, WorkItem};
use crate::pipeline::stages::StageHandler;

pub struct StageExecutor {
    permits: HashMap<&'static str, Arc<Semaphore>>,
}

impl StageExecutor {
    pub fn new(stages: &[Arc<dyn StageHandler>]) -> Self {
        let permits = stages
            .iter()
            .map(|stage| {
                let spec = stage.spec();
                (spec.name, Arc::new(Semaphore::new(spec.concurrency.max(1))))
            })
            .collect();
        Self { permits }
    }

    /// Run one stage over one item: acquire the stage's permit, run the
    /// handler under its timeout, classify the result.
    pub async fn execute(&self, handler: &dyn StageHandler, item: &WorkItem) -> StageOutcome {
        let spec = handler.spec();

        let Some(semaphore) = self.permits.get(spec.name) else {
            return StageOutcome::Failed(PipelineError::stage(
                spec.name,
                "stage has no registered concurrency limit",
            ));
        };
        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return StageOutcome::Failed(PipelineError::stage(
                    spec.name,
                    "stage semaphore closed",
                ));
            }
        };

        debug!(stage = spec.name, item = %item.source_name, "Executing stage");
        match tokio::time::timeout(spec.timeout, handler.process(item)).await {
            Ok(Ok(StageStatus::Completed(output))) => StageOutcome::Success(output),
            Ok(Ok(StageStatus::Skipped(reason))) => StageOutcome::Skipped(reason),
            Ok(Err(err)) => {
                handler.cleanup(item).await;
                StageOutcome::Failed(err)
            }
            Err(_) => {
                handler.cleanup(item).await;
                StageOutcome::Failed(PipelineError::Timeout {
                    stage: spec.name.to_string(),
                    timeout: spec.timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageLimit;
    use crate::models::StageOutput;
    use crate::pipeline::StageSpec;
    use crate::pipeline::state_machine::StageDir;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowStage {
        spec: StageSpec,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowStage {
        fn new(concurrency: usize, timeout: Duration) -> Self {
            let limit = StageLimit {
                concurrency,
                timeout,
            };
            Self {
                spec: StageSpec::new("rename", StageDir::Inbox, StageDir::Processing, &limit),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StageHandler for SlowStage {
        fn spec(&self) -> &StageSpec {
            &self.spec
        }

        async fn process(&self, _item: &WorkItem) -> Result<StageStatus, PipelineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(StageStatus::Completed(StageOutput::default()))
        }
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_stage_limit() {
        let stage = Arc::new(SlowStage::new(2, Duration::from_secs(5)));
        let stages: Vec<Arc<dyn StageHandler>> = vec![stage.clone()];
        let executor = Arc::new(StageExecutor::new(&stages));

        let item = WorkItem::from_path(PathBuf::from("J0801234.jpg"));
        let runs = (0..6).map(|_| {
            let executor = executor.clone();
            let stage = stage.clone();
            let item = item.clone();
            async move {
                executor.execute(stage.as_ref(), &item).await;
            }
        });
        futures::future::join_all(runs).await;

        assert!(stage.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn overruns_surface_as_timeouts() {
        let stage = Arc::new(SlowStage::new(1, Duration::from_millis(5)));
        let stages: Vec<Arc<dyn StageHandler>> = vec![stage.clone()];
        let executor = StageExecutor::new(&stages);

        let item = WorkItem::from_path(PathBuf::from("J0801234.jpg"));
        let outcome = executor.execute(stage.as_ref(), &item).await;
        let StageOutcome::Failed(err) = outcome else {
            panic!("expected a failure");
        };
        assert_eq!(err.kind(), "timeout");
    }
}
