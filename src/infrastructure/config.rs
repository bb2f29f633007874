//! Configuration infrastructure.
//!
//! Settings live in a JSON file under the platform config directory and
//! are grouped by concern: catalog access, database, job schedules, job
//! tuning, control socket, push gateway, logging. Every section carries
//! serde defaults so older files keep loading after new fields appear.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "MDEX_TRACKER_CONFIG";

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schedules: ScheduleConfig,
    #[serde(default)]
    pub jobs: JobTuningConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub pushover: PushoverConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External catalog access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Catalog API origin, no trailing slash.
    pub api_base: String,
    pub user_agent: String,
    /// Referer the upstream API expects on every request.
    pub referer: String,
    pub request_timeout_seconds: u64,
    /// Client-side request budget against the catalog's global limit.
    pub max_requests_per_second: u32,
    /// Page size for feed and details requests.
    pub page_size: u32,
    /// Hard cap on feed pages per incremental scan.
    pub max_feed_pages: u32,
}

/// Database location. `None` resolves to the app data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "defaults::max_connections")]
    pub max_connections: u32,
}

/// Cron expressions (6-field, seconds first) per job type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub incremental: String,
    pub title_refresh: String,
    pub deep_check: String,
}

/// Batch sizes and pacing knobs for the job runners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTuningConfig {
    /// Deep-probe batch cap per run.
    pub deep_batch_size: u32,
    /// Pause after this many probes...
    pub deep_pause_every: u32,
    /// ...for this long.
    pub deep_pause_ms: u64,
    /// Emit progress and persist the counter after this many probes.
    pub deep_progress_every: u32,
    /// Title-refresh batch cap per run.
    pub title_batch_size: u32,
}

/// Control-plane socket location. `None` resolves to the temp dir.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

/// Push gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushoverConfig {
    pub enabled: bool,
    /// Default application token; a per-user override in the store wins.
    #[serde(default)]
    pub app_token: Option<String>,
    pub api_url: String,
}

/// Logging output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "error", "warn", "info", "debug" or "trace".
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    pub json_format: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::API_BASE.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
            referer: defaults::REFERER.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: defaults::MAX_REQUESTS_PER_SECOND,
            page_size: defaults::PAGE_SIZE,
            max_feed_pages: defaults::MAX_FEED_PAGES,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            incremental: defaults::INCREMENTAL_SCHEDULE.to_string(),
            title_refresh: defaults::TITLE_REFRESH_SCHEDULE.to_string(),
            deep_check: defaults::DEEP_CHECK_SCHEDULE.to_string(),
        }
    }
}

impl Default for JobTuningConfig {
    fn default() -> Self {
        Self {
            deep_batch_size: defaults::DEEP_BATCH_SIZE,
            deep_pause_every: defaults::DEEP_PAUSE_EVERY,
            deep_pause_ms: defaults::DEEP_PAUSE_MS,
            deep_progress_every: defaults::DEEP_PROGRESS_EVERY,
            title_batch_size: defaults::TITLE_BATCH_SIZE,
        }
    }
}

impl Default for PushoverConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_token: None,
            api_url: defaults::PUSHOVER_API_URL.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            console_output: true,
            file_output: true,
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Database URL, resolving the default location under the app data
    /// directory when none is configured.
    pub fn database_url(&self) -> Result<String> {
        if let Some(url) = &self.database.url {
            return Ok(url.clone());
        }
        let data_dir = ConfigManager::get_app_data_dir()?;
        Ok(format!(
            "sqlite:{}",
            data_dir.join("mdex-tracker.db").display()
        ))
    }

    /// Control socket path, defaulting into the temp directory.
    pub fn socket_path(&self) -> PathBuf {
        self.control
            .socket_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("mdex-tracker.sock"))
    }

    /// Apply the environment overrides the deployment scripts rely on.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("MDEX_DATABASE_URL") {
            if !url.is_empty() {
                self.database.url = Some(url);
            }
        }
        if let Ok(token) = std::env::var("PUSHOVER_APP_TOKEN") {
            if !token.is_empty() {
                self.pushover.app_token = Some(token);
                self.pushover.enabled = true;
            }
        }
        if let Ok(path) = std::env::var("MDEX_SOCKET_PATH") {
            if !path.is_empty() {
                self.control.socket_path = Some(PathBuf::from(path));
            }
        }
    }
}

/// Loads, creates and persists the configuration file.
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Application configuration directory.
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("mdex-tracker");
        Ok(config_dir)
    }

    /// Application data directory (database, logs).
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join("mdex-tracker");
        Ok(data_dir)
    }

    /// Manager over the default path, honoring `MDEX_TRACKER_CONFIG`.
    pub fn new() -> Result<Self> {
        let config_path = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::get_config_dir()?.join("mdex_tracker_config.json"),
        };
        Ok(Self { config_path })
    }

    /// Manager over an explicit path (tests, one-off tooling).
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Load the configuration, writing the defaults on first run. A file
    /// that no longer parses is backed up and replaced with defaults so
    /// the daemon never refuses to start over a stale config.
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(path = %self.config_path.display(), "configuration file not found, creating default");
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!(path = %self.config_path.display(), "loaded configuration");
                Ok(config)
            }
            Err(parse_error) => {
                warn!(%parse_error, "configuration unreadable, resetting to defaults");
                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!(error = %e, "failed to back up unreadable config");
                } else {
                    warn!(backup = %backup_path.display(), "backed up unreadable config");
                }
                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;
                Ok(default_config)
            }
        }
    }

    /// Persist the configuration as pretty JSON, creating parent dirs.
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }
        let json = serde_json::to_string_pretty(config)
            .context("Failed to serialize configuration")?;
        fs::write(&self.config_path, json)
            .await
            .context("Failed to write configuration file")?;
        Ok(())
    }
}

/// Default configuration values.
pub mod defaults {
    /// MangaDex API origin.
    pub const API_BASE: &str = "https://api.mangadex.org";

    /// User agent sent on every catalog request.
    pub const USER_AGENT: &str = concat!("mdex-tracker/", env!("CARGO_PKG_VERSION"));

    /// Referer the API expects.
    pub const REFERER: &str = "https://mangadex.org/";

    /// Per-request timeout in seconds.
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// The catalog enforces 5 req/s globally; stay at it, never above.
    pub const MAX_REQUESTS_PER_SECOND: u32 = 5;

    /// Feed/details page size (catalog maximum is 100).
    pub const PAGE_SIZE: u32 = 100;

    /// Feed pages fetched per incremental scan before giving up.
    pub const MAX_FEED_PAGES: u32 = 100;

    /// Titles probed per deep run.
    pub const DEEP_BATCH_SIZE: u32 = 200;

    /// Probes between rate-limit pauses.
    pub const DEEP_PAUSE_EVERY: u32 = 5;

    /// Pause length between probe groups, milliseconds.
    pub const DEEP_PAUSE_MS: u64 = 1_500;

    /// Probes between progress emissions.
    pub const DEEP_PROGRESS_EVERY: u32 = 10;

    /// Titles refreshed per metadata run.
    pub const TITLE_BATCH_SIZE: u32 = 100;

    /// Incremental scan: every 20 minutes.
    pub const INCREMENTAL_SCHEDULE: &str = "0 */20 * * * *";

    /// Title refresh: minute 10, every 6 hours.
    pub const TITLE_REFRESH_SCHEDULE: &str = "0 10 */6 * * *";

    /// Deep check: minute 40, every 8 hours.
    pub const DEEP_CHECK_SCHEDULE: &str = "0 40 */8 * * *";

    /// Push gateway message endpoint.
    pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

    /// Default log level.
    pub const LOG_LEVEL: &str = "info";

    pub(super) fn max_connections() -> u32 {
        5
    }
}
