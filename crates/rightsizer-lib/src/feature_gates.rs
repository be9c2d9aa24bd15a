//! Control-plane feature-gate detection
//!
//! The API server exposes `kubernetes_feature_enabled{name="...",stage="..."} 0|1`
//! gauges on `/metrics`. Pods are only resized in place when the
//! `InPlacePodVerticalScaling` gate reports 1. A failed scrape degrades to
//! "no gates enabled" instead of failing the run.

use crate::cache::TtlCache;
use crate::cluster::ClusterClient;
use crate::error::RightsizingError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Gate that allows patching a running pod's resources
pub const IN_PLACE_RESIZE_GATE: &str = "InPlacePodVerticalScaling";

const FEATURE_METRIC: &str = "kubernetes_feature_enabled";

/// Operator override for in-place resizing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InPlaceResizeMode {
    /// Follow the feature gate reported by the control plane
    #[default]
    Auto,
    Enabled,
    Disabled,
}

impl std::str::FromStr for InPlaceResizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "enabled" | "on" | "true" => Ok(Self::Enabled),
            "disabled" | "off" | "false" => Ok(Self::Disabled),
            other => Err(format!("unknown in-place resize mode: {}", other)),
        }
    }
}

/// Extract gate name -> enabled from Prometheus exposition text
pub fn parse_feature_gates(metrics: &str) -> HashMap<String, bool> {
    let mut gates = HashMap::new();

    for line in metrics.lines().map(str::trim) {
        if !line.starts_with(FEATURE_METRIC) {
            continue;
        }
        let Some(name) = label_value(line, "name") else {
            continue;
        };
        // `<metric>{labels} <value> [timestamp]`
        let enabled = line
            .rfind('}')
            .and_then(|close| line[close + 1..].split_whitespace().next())
            .and_then(|v| v.parse::<f64>().ok())
            .map_or(false, |v| v == 1.0);
        gates.insert(name.to_string(), enabled);
    }

    gates
}

/// Value of `label="..."` inside a sample line
fn label_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let open = line.find('{')?;
    let close = line[open..].find('}')? + open;
    line[open + 1..close]
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == label)
        .map(|(_, value)| value.trim().trim_matches('"'))
}

/// Detects and caches feature-gate status
pub struct FeatureGateDetector {
    cluster: Arc<dyn ClusterClient>,
    mode: InPlaceResizeMode,
    cache: TtlCache<(), HashMap<String, bool>>,
}

impl FeatureGateDetector {
    pub fn new(cluster: Arc<dyn ClusterClient>, mode: InPlaceResizeMode, ttl: Duration) -> Self {
        Self {
            cluster,
            mode,
            cache: TtlCache::new(ttl),
        }
    }

    /// Scrape the control plane without caching or degrading
    pub async fn scrape(&self) -> Result<HashMap<String, bool>, RightsizingError> {
        let text = self
            .cluster
            .scrape_feature_gates()
            .await
            .map_err(RightsizingError::Scrape)?;
        Ok(parse_feature_gates(&text))
    }

    /// Gate statuses; empty when the endpoint can't be scraped
    ///
    /// The degraded result is cached like a successful one so a forbidden
    /// `/metrics` is not retried for every deployment.
    pub async fn statuses(&self) -> HashMap<String, bool> {
        if let Some(cached) = self.cache.get(&()) {
            return cached;
        }

        let statuses = match self.scrape().await {
            Ok(statuses) => {
                debug!(gates = statuses.len(), "Scraped control plane feature gates");
                statuses
            }
            Err(e) => {
                warn!(
                    event = "feature_gates_unavailable",
                    error = %e,
                    "Could not read feature gates, treating in-place resize as disabled"
                );
                HashMap::new()
            }
        };
        self.cache.insert((), statuses.clone());
        statuses
    }

    /// Whether running pods may be patched directly
    pub async fn in_place_resize_enabled(&self) -> bool {
        match self.mode {
            InPlaceResizeMode::Enabled => true,
            InPlaceResizeMode::Disabled => false,
            InPlaceResizeMode::Auto => self
                .statuses()
                .await
                .get(IN_PLACE_RESIZE_GATE)
                .copied()
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::InMemoryClusterClient;

    const METRICS: &str = r#"# HELP kubernetes_feature_enabled [BETA] This metric records the data about the stage and enablement of a k8s feature.
# TYPE kubernetes_feature_enabled gauge
kubernetes_feature_enabled{name="APIListChunking",stage="BETA"} 1
kubernetes_feature_enabled{name="InPlacePodVerticalScaling",stage="ALPHA"} 0
kubernetes_feature_enabled{name="SidecarContainers",stage="BETA"} 1
apiserver_request_total{code="200",verb="GET"} 42
"#;

    #[test]
    fn test_parse_feature_gates() {
        let gates = parse_feature_gates(METRICS);
        assert_eq!(gates.len(), 3);
        assert_eq!(gates["APIListChunking"], true);
        assert_eq!(gates[IN_PLACE_RESIZE_GATE], false);
        assert_eq!(gates["SidecarContainers"], true);
    }

    #[test]
    fn test_parse_sample_with_timestamp() {
        let gates = parse_feature_gates(
            "kubernetes_feature_enabled{name=\"InPlacePodVerticalScaling\",stage=\"ALPHA\"} 1 1700000000000\n\
             kubernetes_feature_enabled{name=\"SidecarContainers\",stage=\"BETA\"} 0 1700000000000\n",
        );
        assert_eq!(gates[IN_PLACE_RESIZE_GATE], true);
        assert_eq!(gates["SidecarContainers"], false);
    }

    #[test]
    fn test_parse_ignores_lines_without_name() {
        let gates = parse_feature_gates("kubernetes_feature_enabled{stage=\"BETA\"} 1\n");
        assert!(gates.is_empty());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("AUTO".parse::<InPlaceResizeMode>().unwrap(), InPlaceResizeMode::Auto);
        assert_eq!("on".parse::<InPlaceResizeMode>().unwrap(), InPlaceResizeMode::Enabled);
        assert_eq!(
            "disabled".parse::<InPlaceResizeMode>().unwrap(),
            InPlaceResizeMode::Disabled
        );
        assert!("maybe".parse::<InPlaceResizeMode>().is_err());
    }

    #[tokio::test]
    async fn test_detects_enabled_gate() {
        let cluster = Arc::new(InMemoryClusterClient::new().with_in_place_resize(true));
        let detector =
            FeatureGateDetector::new(cluster, InPlaceResizeMode::Auto, Duration::from_secs(100));
        assert!(detector.in_place_resize_enabled().await);
    }

    #[tokio::test]
    async fn test_disabled_gate() {
        let cluster = Arc::new(InMemoryClusterClient::new().with_metrics_text(METRICS));
        let detector =
            FeatureGateDetector::new(cluster, InPlaceResizeMode::Auto, Duration::from_secs(100));
        assert!(!detector.in_place_resize_enabled().await);
    }

    #[tokio::test]
    async fn test_scrape_failure_degrades_to_disabled() {
        let cluster = Arc::new(InMemoryClusterClient::new());
        let detector =
            FeatureGateDetector::new(cluster, InPlaceResizeMode::Auto, Duration::from_secs(100));

        assert!(detector.scrape().await.is_err());
        assert!(detector.statuses().await.is_empty());
        assert!(!detector.in_place_resize_enabled().await);
    }

    #[tokio::test]
    async fn test_override_skips_detection() {
        let cluster = Arc::new(InMemoryClusterClient::new().with_in_place_resize(false));
        let forced =
            FeatureGateDetector::new(cluster.clone(), InPlaceResizeMode::Enabled, Duration::from_secs(1));
        assert!(forced.in_place_resize_enabled().await);

        let cluster = Arc::new(InMemoryClusterClient::new().with_in_place_resize(true));
        let off = FeatureGateDetector::new(cluster, InPlaceResizeMode::Disabled, Duration::from_secs(1));
        assert!(!off.in_place_resize_enabled().await);
    }
}
