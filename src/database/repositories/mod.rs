//! SeaORM repositories, one per aggregate.
//!
//! Repositories own the translation between domain models and entities;
//! nothing above this layer builds queries directly.

pub mod audit;
pub mod history;
pub mod media;
pub mod raw_file;

pub use audit::AuditRepository;
pub use history::HistoryRepository;
pub use media::MediaActivityRepository;
pub use raw_file::RawFileRepository;
