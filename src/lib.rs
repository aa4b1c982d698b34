//! partflow: product media pipeline and versioned data store.
//!
//! Two pipelines share one database:
//! - the media pipeline advances image files through stage directories
//!   (rename, background removal, format preparation, format generation,
//!   deployment) with per-stage concurrency limits and a full audit trail;
//! - the snapshot ingestor loads raw data dumps into an append-only,
//!   content-hashed version store with a current-pointer per product and
//!   field-level diffing between versions.

pub mod config;
pub mod database;
pub mod entities;
pub mod errors;
pub mod ingestor;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
