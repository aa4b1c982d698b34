//! Error type definitions for partflow
//!
//! Re-exports the error taxonomy used throughout the crate.

pub mod types;

pub use types::{HistoryError, IngestError, PipelineError};
