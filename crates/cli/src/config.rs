//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional defaults read from `~/.config/rsctl/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Recommendation API endpoint used when `--api-url` is not given
    pub api_url: Option<String>,
    /// Name attached to log events
    pub cluster_name: Option<String>,
    /// Deployment concurrency used when `--concurrency` is not given
    pub concurrency: Option<usize>,
}

impl Config {
    /// Load configuration from the default location; missing file means defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Get the configuration file path
    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("rsctl").join("config.json"))
    }
}

/// Explicit kubeconfig, if one was given
///
/// `None` leaves discovery to kube-rs (in-cluster, `KUBECONFIG`, `~/.kube/config`).
pub fn kubeconfig_path(override_path: Option<&str>) -> Option<PathBuf> {
    override_path
        .filter(|p| !p.is_empty() && !p.contains(':'))
        .map(PathBuf::from)
}
