//! External tool execution behind a capability trait.
//!
//! Stages that shell out (background removal, format conversion) depend on
//! `ToolRunner`, never on `tokio::process` directly, so tests can inject
//! fakes and never spawn real binaries.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolCommand;
use crate::errors::PipelineError;

/// How much stderr is carried into the error message.
const STDERR_SNIPPET_LEN: usize = 500;

#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Tool name as it appears in errors and audit context.
    fn name(&self) -> &str;

    /// Run the tool over `input`, producing `output`.
    ///
    /// Failure cases: non-zero exit, missing or empty output file, and
    /// exceeding `timeout` (the process is killed).
    async fn run(&self, input: &Path, output: &Path, timeout: Duration)
    -> Result<(), PipelineError>;
}

/// Production runner: spawns the configured command line with `{input}`
/// and `{output}` placeholders substituted.
pub struct CommandToolRunner {
    name: String,
    command: ToolCommand,
}

impl CommandToolRunner {
    pub fn new(name: impl Into<String>, command: ToolCommand) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        self.command
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input.to_string_lossy())
                    .replace("{output}", &output.to_string_lossy())
            })
            .collect()
    }
}

#[async_trait]
impl ToolRunner for CommandToolRunner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        input: &Path,
        output: &Path,
        timeout: Duration,
    ) -> Result<(), PipelineError> {
        let args = self.build_args(input, output);
        debug!(tool = %self.name, program = %self.command.program, ?args, "Spawning external tool");

        let mut command = Command::new(&self.command.program);
        command.args(&args).kill_on_drop(true);

        let result = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| PipelineError::Timeout {
                stage: self.name.clone(),
                timeout,
            })?
            .map_err(|err| {
                PipelineError::external_tool(
                    &self.name,
                    format!("failed to spawn '{}': {err}", self.command.program),
                )
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let snippet: String = stderr.chars().take(STDERR_SNIPPET_LEN).collect();
            return Err(PipelineError::external_tool(
                &self.name,
                format!("exited with {}: {}", result.status, snippet.trim()),
            ));
        }

        let produced = tokio::fs::metadata(output).await;
        match produced {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(PipelineError::external_tool(
                &self.name,
                format!("produced empty output: {}", output.display()),
            )),
            Err(_) => Err(PipelineError::external_tool(
                &self.name,
                format!("produced no output: {}", output.display()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn placeholders_are_substituted_per_invocation() {
        let runner = CommandToolRunner::new(
            "convert",
            ToolCommand {
                program: "magick".to_string(),
                args: vec!["{input}".to_string(), "-resize".to_string(), "{output}".to_string()],
            },
        );
        let args = runner.build_args(&PathBuf::from("/in/a.png"), &PathBuf::from("/out/a.jpg"));
        assert_eq!(args, vec!["/in/a.png", "-resize", "/out/a.jpg"]);
    }
}
