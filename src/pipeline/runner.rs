//! Pipeline runner: discovery, per-item stage sequencing, audit, and run
//! accounting.
//!
//! A run discovers the first stage's source directory once and drives each
//! discovered item through every stage in order. Items fail individually;
//! the run itself only fails on infrastructure errors.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use futures::StreamExt;
use futures::stream;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, ToolCommand};
use crate::database::Database;
use crate::database::repositories::{AuditRepository, MediaActivityRepository};
use crate::errors::PipelineError;
use crate::models::{AuditEntry, RunStats, StageOutcome, WorkItem};
use crate::pipeline::StageSpec;
use crate::pipeline::executor::StageExecutor;
use crate::pipeline::stages::format_generate::FormatPlan;
use crate::pipeline::stages::{
    BgRemoveStage, DeployStage, FormatGenerateStage, FormatPrepareStage, RenameStage, StageHandler,
};
use crate::pipeline::state_machine::{StageDir, StateMachine};
use crate::services::{CommandToolRunner, ToolRunner};

enum ItemResult {
    Success,
    Skipped,
    Failed,
    Cancelled,
}

pub struct PipelineRunner {
    name: String,
    state: StateMachine,
    stages: Vec<Arc<dyn StageHandler>>,
    executor: StageExecutor,
    audit: AuditRepository,
    max_in_flight: usize,
}

impl PipelineRunner {
    pub fn new(
        name: impl Into<String>,
        state: StateMachine,
        stages: Vec<Arc<dyn StageHandler>>,
        audit: AuditRepository,
        max_in_flight: usize,
    ) -> Self {
        let executor = StageExecutor::new(&stages);
        Self {
            name: name.into(),
            state,
            stages,
            executor,
            audit,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Build the full media pipeline from configuration, optionally
    /// truncated after the named stage.
    pub fn from_config(
        config: &Config,
        database: &Database,
        through: Option<&str>,
    ) -> anyhow::Result<Self> {
        let connection = database.connection();
        let audit = AuditRepository::new(connection.clone());
        let media = MediaActivityRepository::new(connection);
        let state = StateMachine::new(&config.media.base_dir, config.media.overwrite);
        let limits = &config.media.stages;

        let bgremove_tool: Arc<dyn ToolRunner> = Arc::new(CommandToolRunner::new(
            "bgremove",
            config.tools.bgremove.clone(),
        ));
        let plans: Vec<FormatPlan> = config
            .media
            .formats
            .iter()
            .map(|format| {
                let command = ToolCommand {
                    program: config.tools.convert.program.clone(),
                    args: if format.args.is_empty() {
                        config.tools.convert.args.clone()
                    } else {
                        format.args.clone()
                    },
                };
                FormatPlan {
                    format: format.clone(),
                    runner: Arc::new(CommandToolRunner::new(
                        format!("convert_{}", format.name),
                        command,
                    )),
                }
            })
            .collect();

        let mut stages: Vec<Arc<dyn StageHandler>> = vec![
            Arc::new(RenameStage::new(
                StageSpec::new("rename", StageDir::Inbox, StageDir::Processing, &limits.rename),
                config.media.overwrite,
            )),
            Arc::new(BgRemoveStage::new(
                StageSpec::new(
                    "bgremove",
                    StageDir::Processing,
                    StageDir::Review,
                    &limits.bgremove,
                ),
                bgremove_tool,
                state.clone(),
            )),
            Arc::new(FormatPrepareStage::new(StageSpec::new(
                "format_prepare",
                StageDir::Review,
                StageDir::Products,
                &limits.format_prepare,
            ))),
            Arc::new(FormatGenerateStage::new(
                StageSpec::new(
                    "format_generate",
                    StageDir::Products,
                    StageDir::Products,
                    &limits.format_generate,
                ),
                plans,
                media.clone(),
            )),
            Arc::new(DeployStage::new(
                StageSpec::new(
                    "deploy",
                    StageDir::Products,
                    StageDir::Production,
                    &limits.deploy,
                ),
                state.clone(),
                media,
            )),
        ];

        if let Some(through) = through {
            let position = stages
                .iter()
                .position(|stage| stage.spec().name == through)
                .with_context(|| format!("unknown stage: {through}"))?;
            stages.truncate(position + 1);
        }

        Ok(Self::new(
            "media",
            state,
            stages,
            audit,
            config.media.max_in_flight_items,
        ))
    }

    /// Run the pipeline over everything currently in the first stage's
    /// source directory.
    ///
    /// Cancellation is checked between items: in-flight items drain, not
    /// yet started items stay where they are for the next run.
    pub async fn run(&self, cancel: &CancellationToken) -> anyhow::Result<RunStats> {
        let started = Instant::now();
        let mut stats = RunStats::new(&self.name);

        self.state
            .ensure_dirs()
            .await
            .context("failed to create stage directories")?;

        let first = self
            .stages
            .first()
            .context("pipeline has no stages configured")?;
        let discovered = self
            .state
            .discover(first.spec().source)
            .await
            .context("failed to discover items")?;

        info!(
            run_id = %stats.run_id,
            pipeline = %self.name,
            items = discovered.len(),
            "Starting pipeline run"
        );

        let results: Vec<ItemResult> = stream::iter(discovered.into_iter().map(|path| {
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return ItemResult::Cancelled;
                }
                self.process_item(WorkItem::from_path(path)).await
            }
        }))
        .buffer_unordered(self.max_in_flight)
        .collect()
        .await;

        for result in &results {
            match result {
                ItemResult::Success => stats.record_success(),
                ItemResult::Skipped => stats.record_skip(),
                ItemResult::Failed => stats.record_failure(),
                ItemResult::Cancelled => {}
            }
        }
        stats.duration_ms = started.elapsed().as_millis() as u64;

        let status = if cancel.is_cancelled() {
            "cancelled"
        } else {
            "completed"
        };
        if let Err(err) = self.audit.record_run(&stats, status).await {
            warn!(run_id = %stats.run_id, "Failed to persist run summary: {err:#}");
        }

        info!(run_id = %stats.run_id, status, "Pipeline run finished: {stats}");
        Ok(stats)
    }

    /// Drive one item through every stage in order.
    async fn process_item(&self, mut item: WorkItem) -> ItemResult {
        let mut any_work = false;

        for handler in &self.stages {
            let spec = handler.spec();
            let stage_started = Instant::now();
            let outcome = self.executor.execute(handler.as_ref(), &item).await;
            let elapsed_ms = stage_started.elapsed().as_millis() as i64;

            match outcome {
                StageOutcome::Success(output) => {
                    if let Some(path) = output.path {
                        item.path = path;
                    }
                    self.record_audit(
                        &item,
                        AuditEntry::new(self.audit_subject(&item), format!("{}_complete", spec.name))
                            .with_details(output.detail.unwrap_or_default())
                            .with_source_file(&item.source_name)
                            .with_execution_time(elapsed_ms),
                    )
                    .await;

                    if spec.moves_item() {
                        match self
                            .state
                            .move_item(
                                &item.path,
                                spec.source,
                                spec.target,
                                output.target_subdir.as_deref(),
                            )
                            .await
                        {
                            Ok(moved) => item.path = moved,
                            Err(err) => {
                                self.fail_item(&item, spec, err, elapsed_ms).await;
                                return ItemResult::Failed;
                            }
                        }
                    }
                    any_work = true;
                }
                StageOutcome::Skipped(reason) => {
                    self.record_audit(
                        &item,
                        AuditEntry::new(self.audit_subject(&item), format!("{}_skipped", spec.name))
                            .with_details(reason)
                            .with_source_file(&item.source_name)
                            .with_execution_time(elapsed_ms),
                    )
                    .await;

                    if spec.moves_item() {
                        match self
                            .state
                            .move_item(&item.path, spec.source, spec.target, None)
                            .await
                        {
                            Ok(moved) => item.path = moved,
                            Err(err) => {
                                self.fail_item(&item, spec, err, elapsed_ms).await;
                                return ItemResult::Failed;
                            }
                        }
                    }
                }
                StageOutcome::Failed(err) => {
                    self.fail_item(&item, spec, err, elapsed_ms).await;
                    return ItemResult::Failed;
                }
            }
        }

        if any_work {
            ItemResult::Success
        } else {
            ItemResult::Skipped
        }
    }

    /// Audit the failure and park the item in `errors`.
    async fn fail_item(
        &self,
        item: &WorkItem,
        spec: &StageSpec,
        err: PipelineError,
        elapsed_ms: i64,
    ) {
        warn!(
            stage = spec.name,
            item = %item.source_name,
            error = %err,
            "Stage failed"
        );
        self.record_audit(
            item,
            AuditEntry::new(self.audit_subject(item), format!("{}_failed", spec.name))
                .with_details(err.to_string())
                .with_source_file(&item.source_name)
                .with_execution_time(elapsed_ms)
                .with_context(json!({ "error_kind": err.kind() })),
        )
        .await;

        if let Err(move_err) = self.state.move_to_errors(&item.path).await {
            error!(
                item = %item.path.display(),
                "Failed to park item in errors: {move_err}"
            );
        }
    }

    /// Items without a derivable product number are audited under their
    /// arrival filename.
    fn audit_subject(&self, item: &WorkItem) -> String {
        item.product_number
            .clone()
            .unwrap_or_else(|| item.source_name.clone())
    }

    async fn record_audit(&self, item: &WorkItem, entry: AuditEntry) {
        if let Err(err) = self.audit.record(entry).await {
            warn!(item = %item.source_name, "Failed to record audit entry: {err:#}");
        }
    }
}
