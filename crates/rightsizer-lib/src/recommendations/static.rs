//! Fixed-map recommendation provider

use super::{async_trait, RecommendationProvider};
use crate::error::ProviderError;
use crate::models::{
    ContainerRecommendation, DeploymentConfig, NamespaceRecommendations, PolicyMap,
    ResourceRecommendation, RightsizingPolicy,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Serves policies and recommendations from memory
#[derive(Debug, Clone, Default)]
pub struct StaticRecommendationProvider {
    policies: PolicyMap,
    recommendations: HashMap<String, NamespaceRecommendations>,
}

impl StaticRecommendationProvider {
    pub fn new(
        policies: PolicyMap,
        recommendations: HashMap<String, NamespaceRecommendations>,
    ) -> Self {
        Self {
            policies,
            recommendations,
        }
    }

    /// The `opencost/opencost` demo: threshold 0.1, one container
    /// recommended 0.32 cores and 73401320 bytes
    pub fn opencost_demo() -> Self {
        Self::default()
            .with_policy("opencost", "opencost", Some(0.1))
            .with_recommendation(
                "opencost",
                "opencost",
                "opencost",
                ResourceRecommendation {
                    cpu: Some(Decimal::new(32, 2)),
                    memory: Some(Decimal::from(73_401_320u64)),
                },
            )
    }

    /// Configure a deployment; `None` leaves the policy out (threshold 0)
    pub fn with_policy(mut self, namespace: &str, deployment: &str, threshold: Option<f64>) -> Self {
        self.policies
            .entry(namespace.to_string())
            .or_default()
            .insert(
                deployment.to_string(),
                DeploymentConfig {
                    policy: threshold.map(|t| RightsizingPolicy {
                        threshold_percentage: t,
                    }),
                },
            );
        self
    }

    pub fn with_recommendation(
        mut self,
        namespace: &str,
        deployment: &str,
        container: &str,
        requests: ResourceRecommendation,
    ) -> Self {
        self.recommendations
            .entry(namespace.to_string())
            .or_default()
            .entry(deployment.to_string())
            .or_default()
            .insert(container.to_string(), ContainerRecommendation { requests });
        self
    }
}

#[async_trait]
impl RecommendationProvider for StaticRecommendationProvider {
    async fn get_policies(&self) -> Result<PolicyMap, ProviderError> {
        Ok(self.policies.clone())
    }

    async fn get_recommendations(
        &self,
        namespace: &str,
    ) -> Result<NamespaceRecommendations, ProviderError> {
        Ok(self
            .recommendations
            .get(namespace)
            .cloned()
            .unwrap_or_default())
    }
}
