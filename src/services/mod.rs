//! Service-layer components shared by the pipeline stages.

pub mod tool_runner;

pub use tool_runner::{CommandToolRunner, ToolRunner};
