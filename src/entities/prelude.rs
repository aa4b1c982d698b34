pub use super::format_history::Entity as FormatHistory;
pub use super::pipeline_log::Entity as PipelineLogs;
pub use super::product_audit::Entity as ProductAudit;
pub use super::product_history::Entity as ProductHistory;
pub use super::product_history_file::Entity as ProductHistoryFiles;
pub use super::product_latest::Entity as ProductLatest;
pub use super::production_sync::Entity as ProductionSync;
pub use super::raw_file::Entity as RawFiles;
pub use super::raw_row::Entity as RawRows;
