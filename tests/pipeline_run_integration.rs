//! End-to-end media pipeline runs over a temporary directory tree, with
//! fake external tools and an in-memory database.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use partflow::config::{DatabaseConfig, FormatSpecConfig, StageLimit};
use partflow::database::Database;
use partflow::database::repositories::{AuditRepository, MediaActivityRepository};
use partflow::errors::PipelineError;
use partflow::models::RunStats;
use partflow::pipeline::stages::format_generate::FormatPlan;
use partflow::pipeline::stages::{
    BgRemoveStage, DeployStage, FormatGenerateStage, FormatPrepareStage, RenameStage, StageHandler,
};
use partflow::pipeline::state_machine::{StageDir, StateMachine};
use partflow::pipeline::{PipelineRunner, StageSpec};
use partflow::services::ToolRunner;

/// Tool fake: writes a fixed payload to the output path, like a real tool
/// that streams output while it works. Sleeps for `delay` after writing;
/// fails when the input filename contains `fail_marker`.
struct FakeTool {
    name: &'static str,
    fail_marker: Option<&'static str>,
    delay: Option<Duration>,
}

impl FakeTool {
    fn ok(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail_marker: None,
            delay: None,
        })
    }

    fn failing_on(name: &'static str, marker: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail_marker: Some(marker),
            delay: None,
        })
    }

    fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail_marker: None,
            delay: Some(delay),
        })
    }
}

#[async_trait]
impl ToolRunner for FakeTool {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(
        &self,
        input: &Path,
        output: &Path,
        _timeout: Duration,
    ) -> Result<(), PipelineError> {
        tokio::fs::write(output, b"artifact").await?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(marker) = self.fail_marker {
            if input.to_string_lossy().contains(marker) {
                return Err(PipelineError::external_tool(self.name, "exited with 1"));
            }
        }
        Ok(())
    }
}

struct Harness {
    _tmp: TempDir,
    state: StateMachine,
    audit: AuditRepository,
    runner: PipelineRunner,
}

/// Build a full five-stage pipeline with the given bgremove fake and a
/// bgremove timeout.
async fn harness(bgremove_tool: Arc<FakeTool>, bgremove_timeout: Duration) -> Harness {
    let tmp = TempDir::new().unwrap();
    let database = Database::new(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: Some(1),
    })
    .await
    .unwrap();
    database.migrate().await.unwrap();

    let connection = database.connection();
    let audit = AuditRepository::new(connection.clone());
    let media = MediaActivityRepository::new(connection);
    let state = StateMachine::new(tmp.path(), false);

    let fast = StageLimit {
        concurrency: 4,
        timeout: Duration::from_secs(5),
    };
    let bg_limit = StageLimit {
        concurrency: 2,
        timeout: bgremove_timeout,
    };

    let formats = ["web_1200", "thumb_128"].map(|name| FormatSpecConfig {
        name: name.to_string(),
        extension: "jpg".to_string(),
        category: "web".to_string(),
        args: vec![],
    });
    let plans = formats
        .into_iter()
        .map(|format| FormatPlan {
            runner: FakeTool::ok("convert"),
            format,
        })
        .collect();

    let stages: Vec<Arc<dyn StageHandler>> = vec![
        Arc::new(RenameStage::new(
            StageSpec::new("rename", StageDir::Inbox, StageDir::Processing, &fast),
            false,
        )),
        Arc::new(BgRemoveStage::new(
            StageSpec::new("bgremove", StageDir::Processing, StageDir::Review, &bg_limit),
            bgremove_tool,
            state.clone(),
        )),
        Arc::new(FormatPrepareStage::new(StageSpec::new(
            "format_prepare",
            StageDir::Review,
            StageDir::Products,
            &fast,
        ))),
        Arc::new(FormatGenerateStage::new(
            StageSpec::new(
                "format_generate",
                StageDir::Products,
                StageDir::Products,
                &fast,
            ),
            plans,
            media.clone(),
        )),
        Arc::new(DeployStage::new(
            StageSpec::new("deploy", StageDir::Products, StageDir::Production, &fast),
            state.clone(),
            media,
        )),
    ];

    let runner = PipelineRunner::new("media", state.clone(), stages, audit.clone(), 8);

    Harness {
        _tmp: tmp,
        state,
        audit,
        runner,
    }
}

async fn drop_in_inbox(state: &StateMachine, name: &str) {
    let path = state.dir(StageDir::Inbox).join(name);
    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, b"image").await.unwrap();
}

async fn run(harness: &Harness) -> RunStats {
    harness.runner.run(&CancellationToken::new()).await.unwrap()
}

async fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    names
}

#[tokio::test]
async fn one_item_travels_the_whole_pipeline() {
    let h = harness(FakeTool::ok("bgremove"), Duration::from_secs(5)).await;
    drop_in_inbox(&h.state, "j080-1234.JPG").await;

    let stats = run(&h).await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.failed, 0);

    // Inbox drained; final image and deployed artifacts in production.
    assert!(dir_entries(&h.state.dir(StageDir::Inbox)).await.is_empty());
    let deployed = h.state.dir(StageDir::Production).join("J080_1234");
    let names = dir_entries(&deployed).await;
    assert!(names.contains(&"J080_1234.png".to_string()));
    assert!(names.contains(&"J080_1234_web_1200.jpg".to_string()));
    assert!(names.contains(&"J080_1234_thumb_128.jpg".to_string()));

    // Original archived under archive/YYYY-MM/<product>/.
    let archive = h.state.dir(StageDir::Archive);
    let months = dir_entries(&archive).await;
    assert_eq!(months.len(), 1);
    let archived = dir_entries(&archive.join(&months[0]).join("J080_1234")).await;
    assert_eq!(archived, vec!["J080_1234.jpg"]);

    // Every stage audited, in order, plus a run summary row.
    let trail = h.audit.find_for_product("J080_1234").await.unwrap();
    let actions: Vec<&str> = trail.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            "rename_complete",
            "bgremove_complete",
            "format_prepare_complete",
            "format_generate_complete",
            "deploy_complete",
        ]
    );
    let runs = h.audit.recent_runs("media", 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "completed");
    assert_eq!(runs[0].successful, 1);
}

#[tokio::test]
async fn a_failing_item_never_stops_the_batch() {
    let h = harness(
        FakeTool::failing_on("bgremove", "A53003"),
        Duration::from_secs(5),
    )
    .await;
    for number in ["A53001", "A53002", "A53003", "A53004", "A53005"] {
        drop_in_inbox(&h.state, &format!("{number}.jpg")).await;
    }

    let stats = run(&h).await;
    assert_eq!(stats.total, 5);
    assert_eq!(stats.successful, 4);
    assert_eq!(stats.failed, 1);

    let deployed = dir_entries(&h.state.dir(StageDir::Production)).await;
    assert_eq!(deployed, vec!["A53001", "A53002", "A53004", "A53005"]);

    let parked = dir_entries(&h.state.dir(StageDir::Errors)).await;
    assert_eq!(parked.len(), 1);
    assert!(parked[0].ends_with("_A53003.jpg"));

    // The failed cutout's partial scratch output went with it.
    assert!(dir_entries(&h.state.dir(StageDir::Processing)).await.is_empty());

    let trail = h.audit.find_for_product("A53003").await.unwrap();
    let failure = trail.iter().find(|e| e.action == "bgremove_failed").unwrap();
    assert_eq!(
        failure.context.as_ref().unwrap()["error_kind"],
        json!("external_tool")
    );
}

#[tokio::test]
async fn a_timed_out_stage_parks_the_item_with_one_timeout_audit_entry() {
    let h = harness(
        FakeTool::slow("bgremove", Duration::from_millis(300)),
        Duration::from_millis(30),
    )
    .await;
    drop_in_inbox(&h.state, "A52007.jpg").await;

    let stats = run(&h).await;
    assert_eq!(stats.failed, 1);

    let parked = dir_entries(&h.state.dir(StageDir::Errors)).await;
    assert_eq!(parked.len(), 1);

    // The interrupted cutout wrote its scratch file before the deadline;
    // parking the item also removed it.
    assert!(dir_entries(&h.state.dir(StageDir::Processing)).await.is_empty());

    let trail = h.audit.find_for_product("A52007").await.unwrap();
    let timeouts: Vec<_> = trail
        .iter()
        .filter(|e| {
            e.context
                .as_ref()
                .is_some_and(|c| c["error_kind"] == json!("timeout"))
        })
        .collect();
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0].action, "bgremove_failed");
}

#[tokio::test]
async fn a_second_run_discovers_nothing_new() {
    let h = harness(FakeTool::ok("bgremove"), Duration::from_secs(5)).await;
    drop_in_inbox(&h.state, "A52007.jpg").await;

    let first = run(&h).await;
    assert_eq!(first.successful, 1);

    let second = run(&h).await;
    assert_eq!(second.total, 0);

    // Still only one deployed copy of everything.
    let deployed = dir_entries(&h.state.dir(StageDir::Production).join("A52007")).await;
    assert_eq!(deployed.len(), 3);
}

#[tokio::test]
async fn a_cancelled_run_leaves_unstarted_items_in_place() {
    let h = harness(FakeTool::ok("bgremove"), Duration::from_secs(5)).await;
    drop_in_inbox(&h.state, "A52007.jpg").await;
    drop_in_inbox(&h.state, "A52008.jpg").await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let stats = h.runner.run(&cancel).await.unwrap();

    assert_eq!(stats.total, 0);
    let inbox = dir_entries(&h.state.dir(StageDir::Inbox)).await;
    assert_eq!(inbox, vec!["A52007.jpg", "A52008.jpg"]);

    let runs = h.audit.recent_runs("media", 10).await.unwrap();
    assert_eq!(runs[0].status, "cancelled");
}

#[tokio::test]
async fn items_without_a_product_number_fail_at_rename() {
    let h = harness(FakeTool::ok("bgremove"), Duration::from_secs(5)).await;
    drop_in_inbox(&h.state, "_7.jpg").await;

    let stats = run(&h).await;
    assert_eq!(stats.failed, 1);

    let parked = dir_entries(&h.state.dir(StageDir::Errors)).await;
    assert_eq!(parked.len(), 1);
    let trail = h.audit.find_for_product("_7.jpg").await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].action, "rename_failed");
}
