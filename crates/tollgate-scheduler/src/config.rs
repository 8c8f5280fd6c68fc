//! Scheduler configuration.

use crate::watcher::Backoff;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tollgate_core::branch::ScopeType;
use tollgate_core::{Error, Result};
use url::Url;

/// Configuration for the trigger core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Public base URL of the platform UI; prefix of "already running" links.
    #[serde(default = "default_ui_public_url")]
    pub ui_public_url: String,
    /// Scope whose branch rules govern an application.
    #[serde(default = "default_rule_scope")]
    pub rule_scope: ScopeType,
    /// Action types treated as deployments when approval is required.
    #[serde(default = "default_deploy_action_types")]
    pub deploy_action_types: Vec<String>,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

fn default_ui_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_rule_scope() -> ScopeType {
    ScopeType::Project
}

fn default_deploy_action_types() -> Vec<String> {
    vec!["dice".to_string()]
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            ui_public_url: default_ui_public_url(),
            rule_scope: default_rule_scope(),
            deploy_action_types: default_deploy_action_types(),
            watcher: WatcherConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl TollgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(contents)
            .map_err(|e| Error::InvalidInput(format!("config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.ui_public_url)
            .map_err(|e| Error::InvalidInput(format!("ui_public_url {:?}: {e}", self.ui_public_url)))?;
        if self.queue.capacity == 0 {
            return Err(Error::InvalidInput("queue.capacity must be positive".into()));
        }
        if self.queue.workers == 0 {
            return Err(Error::InvalidInput("queue.workers must be positive".into()));
        }
        self.watcher.validate()
    }

    pub fn with_ui_public_url(mut self, url: impl Into<String>) -> Self {
        self.ui_public_url = url.into();
        self
    }

    pub fn with_rule_scope(mut self, scope: ScopeType) -> Self {
        self.rule_scope = scope;
        self
    }

    pub fn with_watcher(mut self, watcher: WatcherConfig) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn with_queue(mut self, capacity: usize, workers: usize) -> Self {
        self.queue = QueueConfig { capacity, workers };
        self
    }
}

/// Largest accepted growth ratio of the poll interval.
pub const MAX_DECLINE_RATIO: f64 = 10.0;

/// Polling schedule of completion watchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    #[serde(default = "default_decline_ratio")]
    pub decline_ratio: f64,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
}

fn default_base_interval_ms() -> u64 {
    1000
}

fn default_decline_ratio() -> f64 {
    1.5
}

fn default_max_interval_secs() -> u64 {
    30
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            decline_ratio: default_decline_ratio(),
            max_interval_secs: default_max_interval_secs(),
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_interval_ms == 0 {
            return Err(Error::InvalidInput("watcher.base_interval_ms must be positive".into()));
        }
        if self.max_interval_secs == 0 {
            return Err(Error::InvalidInput("watcher.max_interval_secs must be positive".into()));
        }
        if !(1.0..=MAX_DECLINE_RATIO).contains(&self.decline_ratio) {
            return Err(Error::InvalidInput(format!(
                "watcher.decline_ratio must be between 1 and {MAX_DECLINE_RATIO}"
            )));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_interval_ms),
            self.decline_ratio,
            Duration::from_secs(self.max_interval_secs),
        )
    }
}

/// Inbound event queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_capacity() -> usize {
    256
}

fn default_workers() -> usize {
    4
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            workers: default_workers(),
        }
    }
}
