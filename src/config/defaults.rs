//! Default values for configuration

pub const DEFAULT_DATABASE_URL: &str = "sqlite://partflow.db";
pub const DEFAULT_MEDIA_BASE: &str = "/srv/media";
pub const DEFAULT_MAX_IN_FLIGHT_ITEMS: usize = 16;

pub const DEFAULT_RENAME_CONCURRENCY: usize = 8;
pub const DEFAULT_BGREMOVE_CONCURRENCY: usize = 2;
pub const DEFAULT_FORMAT_PREPARE_CONCURRENCY: usize = 8;
pub const DEFAULT_FORMAT_GENERATE_CONCURRENCY: usize = 4;
pub const DEFAULT_DEPLOY_CONCURRENCY: usize = 4;
