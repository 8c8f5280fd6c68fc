//! CLI configuration management.

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tollgate_bundle::BundleConfig;
use tollgate_scheduler::TollgateConfig;

/// CLI configuration: the trigger core's settings plus how to reach the
/// platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub tollgate: TollgateConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl CliConfig {
    /// Load from `path`, or from the per-user config file when it exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("load config {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: CliConfig = serde_yaml::from_str(content)?;
        config.tollgate.validate()?;
        Ok(config)
    }

    /// Per-user configuration file path.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "tollgate", "tollgate")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }
}
