pub mod config;
pub mod data_dir;
pub mod error;
pub mod json_bridge;
pub mod schema;
pub mod store;

pub use config::{CONFIG_FILE, Config, DownsamplingConfig};
pub use data_dir::{DATABASE_FILE, DataDir, default_base_dir};
pub use error::{Result, StoreError};
pub use store::{Store, TrajectorySummary};
