//! Core data models for the rightsizing loop

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The two resources the loop rightsizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Memory,
}

impl Resource {
    pub const ALL: [Resource; 2] = [Resource::Cpu, Resource::Memory];

    /// Key used in pod specs and limit ranges
    pub fn key(&self) -> &'static str {
        match self {
            Resource::Cpu => "cpu",
            Resource::Memory => "memory",
        }
    }

    /// Suffix recommendations are written with
    pub fn patch_suffix(&self) -> &'static str {
        match self {
            Resource::Cpu => crate::quantity::CPU_SUFFIX,
            Resource::Memory => crate::quantity::MEMORY_SUFFIX,
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Current resource requests of a container, as raw quantity strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequests {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceRequests {
    pub fn get(&self, resource: Resource) -> Option<&str> {
        match resource {
            Resource::Cpu => self.cpu.as_deref(),
            Resource::Memory => self.memory.as_deref(),
        }
    }

    pub fn set(&mut self, resource: Resource, value: String) {
        match resource {
            Resource::Cpu => self.cpu = Some(value),
            Resource::Memory => self.memory = Some(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

/// A container read from a pod or from a deployment's pod template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub requests: ResourceRequests,
}

/// A live pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub containers: Vec<Container>,
}

/// A deployment and the pod template it stamps out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub namespace: String,
    /// `matchLabels` of the deployment's selector
    pub pod_selector: BTreeMap<String, String>,
    pub template_containers: Vec<Container>,
}

impl Deployment {
    /// Label selector in `k=v,k2=v2` form; `None` when the selector is empty
    pub fn label_selector(&self) -> Option<String> {
        if self.pod_selector.is_empty() {
            return None;
        }
        let terms: Vec<String> = self
            .pod_selector
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        Some(terms.join(","))
    }

    /// Whether a pod's labels satisfy this deployment's selector
    pub fn selects(&self, pod: &Pod) -> bool {
        !self.pod_selector.is_empty()
            && pod.namespace == self.namespace
            && self
                .pod_selector
                .iter()
                .all(|(k, v)| pod.labels.get(k) == Some(v))
    }
}

/// Rightsizing policy for one deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RightsizingPolicy {
    /// Minimum relative change, in `[0, 1]`, before a request is rewritten
    #[serde(default)]
    pub threshold_percentage: f64,
}

/// Entry of the policy map; a missing `policy` means threshold 0
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub policy: Option<RightsizingPolicy>,
}

impl DeploymentConfig {
    pub fn threshold(&self) -> f64 {
        self.policy
            .map(|p| p.threshold_percentage)
            .unwrap_or(0.0)
    }
}

/// namespace -> deployment -> configuration
pub type PolicyMap = HashMap<String, HashMap<String, DeploymentConfig>>;

/// Recommended requests for one container, in base units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecommendation {
    /// Cores
    #[serde(default)]
    pub cpu: Option<Decimal>,
    /// Bytes
    #[serde(default)]
    pub memory: Option<Decimal>,
}

impl ResourceRecommendation {
    /// Recommended value for `resource`; zero counts as no recommendation
    pub fn get(&self, resource: Resource) -> Option<Decimal> {
        let value = match resource {
            Resource::Cpu => self.cpu,
            Resource::Memory => self.memory,
        };
        value.filter(|v| !v.is_zero())
    }
}

/// Wire shape of a container's recommendation: `{"requests": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecommendation {
    #[serde(default)]
    pub requests: ResourceRecommendation,
}

/// deployment -> container -> recommendation, for one namespace
pub type NamespaceRecommendations = HashMap<String, HashMap<String, ContainerRecommendation>>;

/// Sparse set of request overrides for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPatch {
    pub container_name: String,
    pub requests: ResourceRequests,
}

impl ContainerPatch {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.container_name,
            "resources": { "requests": self.requests },
        })
    }
}

/// Patch for a live pod's containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodPatch {
    pub name: String,
    pub namespace: String,
    pub containers: Vec<ContainerPatch>,
}

impl PodPatch {
    /// Strategic-merge body for the pod
    pub fn to_patch_body(&self) -> serde_json::Value {
        let containers: Vec<_> = self.containers.iter().map(ContainerPatch::to_json).collect();
        serde_json::json!({ "spec": { "containers": containers } })
    }
}

/// Patch for a deployment's pod template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPatch {
    pub name: String,
    pub namespace: String,
    pub containers: Vec<ContainerPatch>,
}

impl DeploymentPatch {
    /// Strategic-merge body for the deployment
    pub fn to_patch_body(&self) -> serde_json::Value {
        let containers: Vec<_> = self.containers.iter().map(ContainerPatch::to_json).collect();
        serde_json::json!({ "spec": { "template": { "spec": { "containers": containers } } } })
    }
}

/// One `type: Container` item of a LimitRange, raw quantities keyed by resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBoundDeclaration {
    /// LimitRange item type, e.g. `Container` or `Pod`
    pub kind: String,
    #[serde(default)]
    pub min: BTreeMap<String, String>,
    #[serde(default)]
    pub max: BTreeMap<String, String>,
}
