//! Rightsizer configuration

use anyhow::{bail, Context, Result};
use rightsizer_lib::{BoundsMergeStrategy, InPlaceResizeMode, WalkerConfig};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Where policies and recommendations come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Built-in fixed maps
    #[default]
    Static,
    /// The recommendation API at `recommendation_api_url`
    Http,
}

/// Rightsizer configuration, read from `RIGHTSIZER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to log events
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Seconds between rightsizing runs
    #[serde(default = "default_run_interval")]
    pub run_interval_secs: u64,

    /// Exit after a single run instead of looping
    #[serde(default)]
    pub run_once: bool,

    #[serde(default = "default_max_concurrent_deployments")]
    pub max_concurrent_deployments: usize,

    /// TTL of the policy, recommendation, bounds and feature-gate caches
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default)]
    pub bounds_strategy: BoundsMergeStrategy,

    #[serde(default)]
    pub in_place_resize: InPlaceResizeMode,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub provider: ProviderKind,

    /// Recommendation API endpoint
    #[serde(default = "default_recommendation_api_url")]
    pub recommendation_api_url: String,

    /// Explicit kubeconfig; otherwise in-cluster or default inference
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

fn default_cluster_name() -> String {
    std::env::var("CLUSTER_NAME").unwrap_or_else(|_| "default".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_run_interval() -> u64 {
    300
}

fn default_max_concurrent_deployments() -> usize {
    rightsizer_lib::walker::DEFAULT_MAX_CONCURRENT_DEPLOYMENTS
}

fn default_cache_ttl() -> u64 {
    rightsizer_lib::cache::DEFAULT_CACHE_TTL.as_secs()
}

fn default_recommendation_api_url() -> String {
    "http://recommendation-api:9090".to_string()
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("RIGHTSIZER").try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid rightsizer configuration")?;

        if config.run_interval_secs == 0 {
            bail!("RIGHTSIZER_RUN_INTERVAL_SECS must be greater than zero");
        }
        Ok(config)
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_interval_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            max_concurrent_deployments: self.max_concurrent_deployments,
            dry_run: self.dry_run,
            bounds_strategy: self.bounds_strategy,
            in_place_resize: self.in_place_resize,
            cache_ttl: self.cache_ttl(),
            cluster_name: self.cluster_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("RIGHTSIZER")
            .try_parsing(true)
            .source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = AgentConfig::from_source(env(&[])).unwrap();

        assert_eq!(config.api_port, 8080);
        assert_eq!(config.run_interval_secs, 300);
        assert!(!config.run_once);
        assert_eq!(config.max_concurrent_deployments, 10);
        assert_eq!(config.cache_ttl_secs, 100);
        assert_eq!(config.bounds_strategy, BoundsMergeStrategy::Intersection);
        assert_eq!(config.in_place_resize, InPlaceResizeMode::Auto);
        assert_eq!(config.provider, ProviderKind::Static);
        assert!(config.kubeconfig.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = AgentConfig::from_source(env(&[
            ("RIGHTSIZER_MAX_CONCURRENT_DEPLOYMENTS", "4"),
            ("RIGHTSIZER_BOUNDS_STRATEGY", "widest"),
            ("RIGHTSIZER_IN_PLACE_RESIZE", "disabled"),
            ("RIGHTSIZER_PROVIDER", "http"),
            ("RIGHTSIZER_DRY_RUN", "true"),
        ]))
        .unwrap();

        let walker = config.walker_config();
        assert_eq!(walker.max_concurrent_deployments, 4);
        assert_eq!(walker.bounds_strategy, BoundsMergeStrategy::Widest);
        assert_eq!(walker.in_place_resize, InPlaceResizeMode::Disabled);
        assert!(walker.dry_run);
        assert_eq!(config.provider, ProviderKind::Http);
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let result = AgentConfig::from_source(env(&[("RIGHTSIZER_BOUNDS_STRATEGY", "loosest")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_run_interval_is_rejected() {
        let err = AgentConfig::from_source(env(&[("RIGHTSIZER_RUN_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("RUN_INTERVAL_SECS"));
    }
}
