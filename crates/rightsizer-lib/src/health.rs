//! Health check infrastructure for the rightsizer
//!
//! Tracks component health plus the outcome of each rightsizing run, for
//! Kubernetes liveness and readiness probes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Degraded,
            message: Some(message.into()),
            last_check_timestamp: Utc::now().timestamp(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Unhealthy,
            message: Some(message.into()),
            last_check_timestamp: Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_successful_run: Option<DateTime<Utc>>,
}

impl HealthResponse {
    /// Compute overall status from component statuses
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const CLUSTER: &str = "cluster";
    pub const RECOMMENDATIONS: &str = "recommendations";
    pub const RUNS: &str = "runs";
}

#[derive(Debug)]
struct RunState {
    started_at: DateTime<Utc>,
    completed_runs: u64,
    last_success: Option<DateTime<Utc>>,
}

impl RunState {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            completed_runs: 0,
            last_success: None,
        }
    }
}

/// Health registry for tracking component health and run outcomes
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    runs: Arc<RwLock<RunState>>,
    stale_after: Duration,
}

impl HealthRegistry {
    /// `stale_after`: how long without a successful run before liveness fails
    pub fn new(stale_after: Duration) -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            runs: Arc::new(RwLock::new(RunState::new())),
            stale_after,
        }
    }

    /// Liveness window of three run intervals
    pub fn for_interval(run_interval: Duration) -> Self {
        Self::new(run_interval * 3)
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Update component health status
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// A run finished without a fatal error
    pub async fn record_run_success(&self) {
        self.record_run_success_at(Utc::now()).await;
    }

    async fn record_run_success_at(&self, at: DateTime<Utc>) {
        {
            let mut runs = self.runs.write().await;
            runs.completed_runs += 1;
            runs.last_success = Some(at);
        }
        self.set_healthy(components::RUNS).await;
    }

    /// A run aborted; readiness still flips because the loop is alive
    pub async fn record_run_failure(&self, message: impl Into<String>) {
        {
            let mut runs = self.runs.write().await;
            runs.completed_runs += 1;
        }
        self.set_degraded(components::RUNS, message).await;
    }

    /// Get health response
    pub async fn health(&self) -> HealthResponse {
        let mut components = self.components.read().await.clone();
        let (started_at, last_success) = {
            let runs = self.runs.read().await;
            (runs.started_at, runs.last_success)
        };

        // Before the first success the window counts from start-up
        let age = Utc::now().signed_duration_since(last_success.unwrap_or(started_at));
        let stale = chrono::Duration::from_std(self.stale_after)
            .map(|limit| age > limit)
            .unwrap_or(false);
        if stale {
            components.insert(
                components::RUNS.to_string(),
                ComponentHealth::unhealthy(format!(
                    "no successful run for {}s",
                    age.num_seconds()
                )),
            );
        }

        let status = HealthResponse::compute_status(&components);
        HealthResponse {
            status,
            components,
            last_successful_run: last_success,
        }
    }

    /// Get readiness response
    pub async fn readiness(&self) -> ReadinessResponse {
        let completed = self.runs.read().await.completed_runs;

        if completed == 0 {
            ReadinessResponse {
                ready: false,
                reason: Some("No rightsizing run completed yet".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HealthRegistry {
        HealthRegistry::for_interval(Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let health = registry().health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(health.last_successful_run.is_none());
    }

    #[tokio::test]
    async fn test_health_registry_degraded_status() {
        let registry = registry();
        registry.register(components::CLUSTER).await;
        registry.register(components::RECOMMENDATIONS).await;

        registry
            .set_degraded(components::RECOMMENDATIONS, "slow responses")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_readiness_flips_after_first_run() {
        let registry = registry();
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());

        registry.record_run_failure("provider down").await;
        assert!(registry.readiness().await.ready);
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_recent_success_is_healthy() {
        let registry = registry();
        registry.record_run_success().await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.last_successful_run.is_some());
    }

    #[tokio::test]
    async fn test_never_succeeding_runs_become_unhealthy() {
        let registry = HealthRegistry::new(Duration::from_millis(10));
        registry.record_run_failure("namespaces forbidden").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.record_run_failure("namespaces forbidden").await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(health.last_successful_run.is_none());
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_stale_success_is_unhealthy() {
        let registry = HealthRegistry::new(Duration::from_secs(60));
        registry
            .record_run_success_at(Utc::now() - chrono::Duration::seconds(120))
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(!health.status.is_operational());
    }
}
