pub mod api;
pub mod buildspec;
pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod stack;
pub mod trigger;
pub mod utils;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use error::{CodebuildError, Result};
use notify::Notifier;
use notify::store::NotificationStore;

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_MAX_WAIT_SECS: u64 = 3 * 60 * 60;
const DEFAULT_MAX_NOTIFICATIONS: usize = 100;

/// Settings of the build notifier service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotifierConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    pub slack_notify_url: String,
    /// Full `arn:` of the alert topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sns_topic_arn: Option<String>,
    /// Topic looked up by name at startup when no ARN is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sns_topic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify_secret: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    #[serde(default = "default_max_notifications")]
    pub max_notifications: usize,
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_max_wait() -> u64 {
    DEFAULT_MAX_WAIT_SECS
}

fn default_max_notifications() -> usize {
    DEFAULT_MAX_NOTIFICATIONS
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            slack_notify_url: String::new(),
            sns_topic_arn: None,
            sns_topic_name: None,
            notify_secret: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_wait_secs: DEFAULT_MAX_WAIT_SECS,
            max_notifications: DEFAULT_MAX_NOTIFICATIONS,
        }
    }
}

impl NotifierConfig {
    /// Returns the signing secret if requests must carry a valid signature.
    pub fn signing_secret(&self) -> Option<&str> {
        self.notify_secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Load and parse the notifier configuration file
pub async fn load_notifier_config(path: &Path) -> Result<NotifierConfig> {
    let config_str = tokio::fs::read_to_string(path).await.map_err(|e| {
        CodebuildError::ConfigError(format!("Failed to read config file {:?}: {}", path, e))
    })?;

    let config: NotifierConfig = toml::from_str(&config_str).map_err(|e| {
        CodebuildError::ConfigError(format!("Failed to parse config file {:?}: {}", path, e))
    })?;

    if config.slack_notify_url.trim().is_empty() {
        return Err(CodebuildError::ConfigError(format!(
            "`slack_notify_url` is empty in {:?}",
            path
        )));
    }

    if let Some(arn) = config.sns_topic_arn.as_deref().filter(|a| !a.starts_with("arn:")) {
        return Err(CodebuildError::ConfigError(format!(
            "`sns_topic_arn` in {:?} is not an ARN: {:?} (use `sns_topic_name` for a bare topic name)",
            path, arn
        )));
    }

    Ok(config)
}

pub struct AppState {
    pub store: Mutex<NotificationStore>,
    pub config: NotifierConfig,
    pub notifier: Notifier,
    pub start_time: Instant,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: NotifierConfig, notifier: Notifier) -> Self {
        Self {
            store: Mutex::new(NotificationStore::new(config.max_notifications)),
            config,
            notifier,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<AppState>;
