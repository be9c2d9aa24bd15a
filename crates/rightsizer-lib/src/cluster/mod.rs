//! Cluster API seam
//!
//! The walker only talks to the cluster through [`ClusterClient`]. The kube-rs
//! backed [`KubeClusterClient`] is used in production; [`InMemoryClusterClient`]
//! is a deterministic double with failure and latency injection.

mod kube_client;
mod memory;

pub use kube_client::KubeClusterClient;
pub use memory::{InMemoryClusterClient, PatchCall};

use crate::error::ClusterError;
use crate::models::{Deployment, DeploymentPatch, Pod, PodPatch, ResourceBoundDeclaration};

pub use async_trait::async_trait;

/// Operations the rightsizing loop needs from the cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Names of every namespace
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError>;

    /// Deployments of one namespace
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError>;

    /// Live pods matched by the deployment's selector
    async fn list_pods_for_deployment(
        &self,
        deployment: &Deployment,
    ) -> Result<Vec<Pod>, ClusterError>;

    /// Every LimitRange item declared in the namespace, of any kind
    async fn list_resource_bounds(
        &self,
        namespace: &str,
    ) -> Result<Vec<ResourceBoundDeclaration>, ClusterError>;

    async fn patch_pod(&self, patch: &PodPatch) -> Result<(), ClusterError>;

    async fn patch_deployment(&self, patch: &DeploymentPatch) -> Result<(), ClusterError>;

    /// Raw Prometheus exposition of the control plane `/metrics` endpoint,
    /// from which feature-gate lines are read
    async fn scrape_feature_gates(&self) -> Result<String, ClusterError>;
}
