mod file_config;

pub use file_config::{CheckerConfig, FileConfig, QueueConfig, UpdatesConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub source_url: Option<String>,
    pub source_timeout_sec: u64,
    pub library_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub notify_webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub source_url: Option<String>,
    pub source_timeout_sec: u64,
    pub library_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub notify_webhook_url: Option<String>,

    // Feature configs (with defaults)
    pub queue: QueueSettings,
    pub checker: CheckerSettings,
    pub updates: UpdatesSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let source_url = file.source_url.or_else(|| cli.source_url.clone());
        let source_timeout_sec = file.source_timeout_sec.unwrap_or(cli.source_timeout_sec);
        let library_dir = file
            .library_dir
            .map(PathBuf::from)
            .or_else(|| cli.library_dir.clone())
            .unwrap_or_else(|| db_dir.join("library"));
        let temp_dir = file
            .temp_dir
            .map(PathBuf::from)
            .or_else(|| cli.temp_dir.clone())
            .unwrap_or_else(|| db_dir.join("tmp"));
        let notify_webhook_url = file
            .notify_webhook_url
            .or_else(|| cli.notify_webhook_url.clone());

        let queue_defaults = QueueSettings::default();
        let queue_file = file.queue.unwrap_or_default();
        let queue = QueueSettings {
            max_retries: queue_file.max_retries.unwrap_or(queue_defaults.max_retries),
            initial_backoff_secs: queue_file
                .initial_backoff_secs
                .unwrap_or(queue_defaults.initial_backoff_secs),
            max_backoff_secs: queue_file
                .max_backoff_secs
                .unwrap_or(queue_defaults.max_backoff_secs),
            backoff_multiplier: queue_file
                .backoff_multiplier
                .unwrap_or(queue_defaults.backoff_multiplier),
            poll_interval_secs: queue_file
                .poll_interval_secs
                .unwrap_or(queue_defaults.poll_interval_secs),
        };
        if queue.backoff_multiplier < 1.0 {
            bail!(
                "queue.backoff_multiplier must be at least 1.0, got {}",
                queue.backoff_multiplier
            );
        }

        let checker_defaults = CheckerSettings::default();
        let checker_file = file.checker.unwrap_or_default();
        let checker = CheckerSettings {
            enabled: checker_file.enabled.unwrap_or(checker_defaults.enabled),
            interval_secs: checker_file
                .interval_secs
                .unwrap_or(checker_defaults.interval_secs),
            delay_between_requests_ms: checker_file
                .delay_between_requests_ms
                .unwrap_or(checker_defaults.delay_between_requests_ms),
            run_on_startup: checker_file
                .run_on_startup
                .unwrap_or(checker_defaults.run_on_startup),
        };
        if checker.interval_secs == 0 {
            bail!("checker.interval_secs must be greater than zero");
        }

        let updates_file = file.updates.unwrap_or_default();
        let updates = UpdatesSettings {
            heartbeat_interval_secs: updates_file
                .heartbeat_interval_secs
                .unwrap_or(UpdatesSettings::default().heartbeat_interval_secs)
                .max(1),
        };

        Ok(Self {
            db_dir,
            port,
            logging_level,
            source_url,
            source_timeout_sec,
            library_dir,
            temp_dir,
            notify_webhook_url,
            queue,
            checker,
            updates,
        })
    }

    pub fn downloads_db_path(&self) -> PathBuf {
        self.db_dir.join("downloads.db")
    }

    pub fn requests_db_path(&self) -> PathBuf {
        self.db_dir.join("requests.db")
    }
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub poll_interval_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_secs: 30,
            max_backoff_secs: 3600,
            backoff_multiplier: 2.0,
            poll_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckerSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    pub delay_between_requests_ms: u64,
    pub run_on_startup: bool,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            delay_between_requests_ms: 2000,
            run_on_startup: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdatesSettings {
    pub heartbeat_interval_secs: u64,
}

impl Default for UpdatesSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
