//! Configuration for the partflow pipelines
//!
//! All recognized options are enumerated here and loaded from a TOML file.
//! There is no ambient settings object: `main` constructs one `Config` and
//! passes it down.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {path}"))?;
        info!("Configuration loaded from {path}");
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    pub max_connections: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: None,
        }
    }
}

/// Media pipeline configuration: the base directory holding the stage
/// directories, per-stage concurrency ceilings and timeouts, and the output
/// format list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_base")]
    pub base_dir: PathBuf,
    /// Whether a move may overwrite a same-named item at the destination.
    #[serde(default)]
    pub overwrite: bool,
    /// Upper bound on items processed concurrently within one run. The
    /// real throttle is each stage's own concurrency limit.
    #[serde(default = "default_max_in_flight_items")]
    pub max_in_flight_items: usize,
    #[serde(default)]
    pub stages: StageLimitsConfig,
    #[serde(default = "default_format_specs")]
    pub formats: Vec<FormatSpecConfig>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            base_dir: default_media_base(),
            overwrite: false,
            max_in_flight_items: default_max_in_flight_items(),
            stages: StageLimitsConfig::default(),
            formats: default_format_specs(),
        }
    }
}

/// Per-stage concurrency cap and wall-clock timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLimit {
    pub concurrency: usize,
    #[serde(with = "duration_serde::duration")]
    pub timeout: Duration,
}

impl StageLimit {
    fn new(concurrency: usize, timeout: Duration) -> Self {
        Self {
            concurrency,
            timeout,
        }
    }
}

/// Limits for each media stage. Background removal is the most expensive
/// stage and defaults to the lowest ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLimitsConfig {
    #[serde(default = "default_rename_limit")]
    pub rename: StageLimit,
    #[serde(default = "default_bgremove_limit")]
    pub bgremove: StageLimit,
    #[serde(default = "default_format_prepare_limit")]
    pub format_prepare: StageLimit,
    #[serde(default = "default_format_generate_limit")]
    pub format_generate: StageLimit,
    #[serde(default = "default_deploy_limit")]
    pub deploy: StageLimit,
}

impl Default for StageLimitsConfig {
    fn default() -> Self {
        Self {
            rename: default_rename_limit(),
            bgremove: default_bgremove_limit(),
            format_prepare: default_format_prepare_limit(),
            format_generate: default_format_generate_limit(),
            deploy: default_deploy_limit(),
        }
    }
}

/// One output format generated from an approved source image. `args` is the
/// conversion tool's argument template; `{input}` and `{output}` are
/// substituted per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatSpecConfig {
    pub name: String,
    pub extension: String,
    /// Subdirectory grouping (print, web, thumbnail, transparent).
    pub category: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Snapshot ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Payload field carrying the entity (product) number.
    #[serde(default = "default_entity_field")]
    pub entity_field: String,
    /// Payload field carrying the alternate number, if any.
    #[serde(default = "default_alternate_field")]
    pub alternate_field: String,
    /// Payload field carrying the source-reported modification timestamp.
    #[serde(default = "default_modified_field")]
    pub modified_field: String,
    /// Keys stripped from the payload before the latest projection and
    /// before diffing. The content hash always covers the full payload.
    #[serde(default = "default_volatile_fields")]
    pub volatile_fields: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            entity_field: default_entity_field(),
            alternate_field: default_alternate_field(),
            modified_field: default_modified_field(),
            volatile_fields: default_volatile_fields(),
        }
    }
}

/// Command line for one external tool. `{input}` and `{output}` in `args`
/// are substituted per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_bgremove_tool")]
    pub bgremove: ToolCommand,
    #[serde(default = "default_convert_tool")]
    pub convert: ToolCommand,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bgremove: default_bgremove_tool(),
            convert: default_convert_tool(),
        }
    }
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_media_base() -> PathBuf {
    PathBuf::from(DEFAULT_MEDIA_BASE)
}

fn default_max_in_flight_items() -> usize {
    DEFAULT_MAX_IN_FLIGHT_ITEMS
}

fn default_rename_limit() -> StageLimit {
    StageLimit::new(DEFAULT_RENAME_CONCURRENCY, Duration::from_secs(30))
}

fn default_bgremove_limit() -> StageLimit {
    StageLimit::new(DEFAULT_BGREMOVE_CONCURRENCY, Duration::from_secs(300))
}

fn default_format_prepare_limit() -> StageLimit {
    StageLimit::new(DEFAULT_FORMAT_PREPARE_CONCURRENCY, Duration::from_secs(30))
}

fn default_format_generate_limit() -> StageLimit {
    StageLimit::new(DEFAULT_FORMAT_GENERATE_CONCURRENCY, Duration::from_secs(300))
}

fn default_deploy_limit() -> StageLimit {
    StageLimit::new(DEFAULT_DEPLOY_CONCURRENCY, Duration::from_secs(120))
}

fn default_entity_field() -> String {
    "number".to_string()
}

fn default_alternate_field() -> String {
    "other_number".to_string()
}

fn default_modified_field() -> String {
    "date_modified".to_string()
}

fn default_volatile_fields() -> Vec<String> {
    vec!["date_modified".to_string()]
}

fn default_bgremove_tool() -> ToolCommand {
    ToolCommand {
        program: "rembg".to_string(),
        args: vec!["i".to_string(), "{input}".to_string(), "{output}".to_string()],
    }
}

fn default_convert_tool() -> ToolCommand {
    ToolCommand {
        program: "magick".to_string(),
        args: vec!["{input}".to_string(), "{output}".to_string()],
    }
}

fn default_format_specs() -> Vec<FormatSpecConfig> {
    vec![
        FormatSpecConfig {
            name: "print_300dpi".to_string(),
            extension: "tif".to_string(),
            category: "print".to_string(),
            args: vec![],
        },
        FormatSpecConfig {
            name: "web_1200".to_string(),
            extension: "jpg".to_string(),
            category: "web".to_string(),
            args: vec![],
        },
        FormatSpecConfig {
            name: "thumb_128".to_string(),
            extension: "jpg".to_string(),
            category: "thumbnail".to_string(),
            args: vec![],
        },
        FormatSpecConfig {
            name: "transparent_original".to_string(),
            extension: "png".to_string(),
            category: "transparent".to_string(),
            args: vec![],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_stage() {
        let config = Config::default();
        assert!(config.media.stages.bgremove.concurrency <= config.media.stages.rename.concurrency);
        assert_eq!(config.media.stages.bgremove.timeout, Duration::from_secs(300));
        assert_eq!(config.ingest.volatile_fields, vec!["date_modified"]);
    }

    #[test]
    fn omitted_sections_fall_back_to_their_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.database.url, DEFAULT_DATABASE_URL);
        assert_eq!(config.tools.bgremove.program, "rembg");
        assert_eq!(config.ingest.entity_field, "number");
    }

    #[test]
    fn durations_parse_from_human_readable_strings() {
        let toml = r#"
            [database]
            url = "sqlite::memory:"

            [media.stages.bgremove]
            concurrency = 1
            timeout = "2m"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.media.stages.bgremove.timeout, Duration::from_secs(120));
        assert_eq!(config.media.stages.rename.concurrency, 8);
    }
}
