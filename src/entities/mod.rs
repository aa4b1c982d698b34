//! SeaORM entity definitions for the partflow schema

pub mod format_history;
pub mod pipeline_log;
pub mod product_audit;
pub mod product_history;
pub mod product_history_file;
pub mod product_latest;
pub mod production_sync;
pub mod raw_file;
pub mod raw_row;

pub mod prelude;
