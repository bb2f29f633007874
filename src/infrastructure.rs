//! Infrastructure layer: database access, catalog client, push gateway,
//! configuration and logging.
//!
//! Everything here implements a domain contract or wires up process-level
//! plumbing; no reconciliation logic lives in this layer.

pub mod config;
pub mod database_connection;
pub mod logging;
pub mod mangadex_client;
pub mod pushover;
pub mod watermark_repository;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use mangadex_client::{MangaDexClient, MangaDexClientConfig};
pub use pushover::PushoverClient;
pub use watermark_repository::SqliteWatermarkStore;
