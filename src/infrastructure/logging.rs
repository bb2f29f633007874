//! Logging setup: console plus daily-rotated file output via tracing.
//!
//! `RUST_LOG` overrides everything; otherwise the configured level is
//! applied with noisy dependency targets (sqlx statement logs, HTTP
//! internals) held down so job runs stay readable at `info`.

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

// Keeps the non-blocking writer guards alive for the process lifetime.
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Log directory under the app data dir, falling back to `./logs` when
/// no platform data directory exists.
pub fn get_log_directory() -> PathBuf {
    ConfigManager::get_app_data_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| PathBuf::from("logs"))
}

/// Initialize logging with the default configuration.
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default())
}

fn build_env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(level);
        if !level.eq_ignore_ascii_case("trace") {
            filter = filter
                .add_directive("sqlx::query=warn".parse().expect("static directive"))
                .add_directive("sqlx::migrate=info".parse().expect("static directive"))
                .add_directive("reqwest=info".parse().expect("static directive"))
                .add_directive("hyper=warn".parse().expect("static directive"))
                .add_directive("h2=warn".parse().expect("static directive"))
                .add_directive("tokio_cron_scheduler=info".parse().expect("static directive"));
            // The configured level may be arbitrary text; an unparseable
            // one just skips the per-crate directive.
            if let Ok(directive) = format!("mdex_tracker_lib={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    })
}

/// Initialize logging with an explicit configuration.
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    let registry = Registry::default().with(build_env_filter(&config.level));

    match (config.file_output, config.console_output) {
        (true, true) | (true, false) => {
            let log_dir = get_log_directory();
            std::fs::create_dir_all(&log_dir)
                .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

            let file_appender = rolling::daily(&log_dir, "mdex-tracker.log");
            let (file_writer, file_guard) = non_blocking(file_appender);
            LOG_GUARDS
                .lock()
                .map_err(|_| anyhow!("log guard storage poisoned"))?
                .push(file_guard);

            match (config.json_format, config.console_output) {
                (true, true) => {
                    let file_layer = fmt::Layer::new()
                        .json()
                        .with_writer(file_writer)
                        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                        .with_target(true)
                        .with_ansi(false);
                    let console_layer = fmt::Layer::new()
                        .with_writer(std::io::stdout)
                        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                        .with_target(false);
                    registry.with(file_layer).with(console_layer).init();
                }
                (true, false) => {
                    let file_layer = fmt::Layer::new()
                        .json()
                        .with_writer(file_writer)
                        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                        .with_target(true)
                        .with_ansi(false);
                    registry.with(file_layer).init();
                }
                (false, true) => {
                    let file_layer = fmt::Layer::new()
                        .with_writer(file_writer)
                        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                        .with_target(false)
                        .with_ansi(false);
                    let console_layer = fmt::Layer::new()
                        .with_writer(std::io::stdout)
                        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                        .with_target(false);
                    registry.with(file_layer).with(console_layer).init();
                }
                (false, false) => {
                    let file_layer = fmt::Layer::new()
                        .with_writer(file_writer)
                        .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                        .with_target(false)
                        .with_ansi(false);
                    registry.with(file_layer).init();
                }
            }

            info!(directory = %log_dir.display(), "file logging active");
        }
        (false, true) => {
            let console_layer = fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(ChronoUtc::new(TIME_FORMAT.to_string()))
                .with_target(false);
            registry.with(console_layer).init();
        }
        (false, false) => {
            return Err(anyhow!("No logging output configured"));
        }
    }

    info!(level = %config.level, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_directory_is_deterministic() {
        let dir = get_log_directory();
        assert!(dir.to_string_lossy().ends_with("logs"));
    }

    #[test]
    fn default_logging_config_has_output() {
        let config = LoggingConfig::default();
        assert!(config.console_output || config.file_output);
        assert!(!config.level.is_empty());
    }
}
