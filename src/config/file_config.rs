use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub source_url: Option<String>,
    pub source_timeout_sec: Option<u64>,
    pub library_dir: Option<String>,
    pub temp_dir: Option<String>,
    pub notify_webhook_url: Option<String>,

    // Feature configs
    pub queue: Option<QueueConfig>,
    pub checker: Option<CheckerConfig>,
    pub updates: Option<UpdatesConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct QueueConfig {
    pub max_retries: Option<u32>,
    pub initial_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CheckerConfig {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    pub delay_between_requests_ms: Option<u64>,
    pub run_on_startup: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct UpdatesConfig {
    pub heartbeat_interval_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
