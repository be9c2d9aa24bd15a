//! In-memory [`ClusterClient`] for tests and offline planning
//!
//! Holds a fixed cluster state, records every patch it receives and can be
//! told to fail specific calls or to delay them.

use super::{async_trait, ClusterClient};
use crate::error::ClusterError;
use crate::models::{Deployment, DeploymentPatch, Pod, PodPatch, ResourceBoundDeclaration};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A patch received by the in-memory client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchCall {
    Pod(PodPatch),
    Deployment(DeploymentPatch),
}

/// Deterministic cluster double
#[derive(Debug, Default)]
pub struct InMemoryClusterClient {
    namespaces: Vec<String>,
    deployments: HashMap<String, Vec<Deployment>>,
    pods: Vec<Pod>,
    bounds: HashMap<String, Vec<ResourceBoundDeclaration>>,
    metrics_text: Option<String>,

    failing_namespaces: HashSet<String>,
    failing_deployment_listings: HashSet<String>,
    failing_pod_patches: HashSet<String>,
    failing_deployment_patches: HashSet<String>,
    namespace_listing_fails: bool,
    call_delay: Option<Duration>,

    patches: Mutex<Vec<PatchCall>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter when a call finishes
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        if !self.namespaces.contains(&namespace) {
            self.namespaces.push(namespace);
        }
        self
    }

    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        self = self.with_namespace(deployment.namespace.clone());
        self.deployments
            .entry(deployment.namespace.clone())
            .or_default()
            .push(deployment);
        self
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(pod);
        self
    }

    pub fn with_bounds(
        mut self,
        namespace: impl Into<String>,
        declaration: ResourceBoundDeclaration,
    ) -> Self {
        self.bounds.entry(namespace.into()).or_default().push(declaration);
        self
    }

    /// Exposition text served by [`ClusterClient::scrape_feature_gates`];
    /// without it the scrape fails with `Forbidden`
    pub fn with_metrics_text(mut self, text: impl Into<String>) -> Self {
        self.metrics_text = Some(text.into());
        self
    }

    /// Shorthand for a metrics endpoint reporting the in-place resize gate
    pub fn with_in_place_resize(self, enabled: bool) -> Self {
        let value = if enabled { 1 } else { 0 };
        self.with_metrics_text(format!(
            "# TYPE kubernetes_feature_enabled gauge\n\
             kubernetes_feature_enabled{{name=\"InPlacePodVerticalScaling\",stage=\"ALPHA\"}} {}\n",
            value
        ))
    }

    pub fn fail_namespace_listing(mut self) -> Self {
        self.namespace_listing_fails = true;
        self
    }

    /// Make every listing inside `namespace` (deployments, bounds) fail
    pub fn fail_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.failing_namespaces.insert(namespace.into());
        self
    }

    /// Make listing the pods of one deployment fail
    pub fn fail_pod_listing(mut self, deployment: impl Into<String>) -> Self {
        self.failing_deployment_listings.insert(deployment.into());
        self
    }

    pub fn fail_pod_patch(mut self, pod: impl Into<String>) -> Self {
        self.failing_pod_patches.insert(pod.into());
        self
    }

    pub fn fail_deployment_patch(mut self, deployment: impl Into<String>) -> Self {
        self.failing_deployment_patches.insert(deployment.into());
        self
    }

    /// Delay every pod listing and patch call
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// Every patch received, in arrival order
    pub fn patches(&self) -> Vec<PatchCall> {
        self.patches.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn pod_patches(&self) -> Vec<PodPatch> {
        self.patches()
            .into_iter()
            .filter_map(|p| match p {
                PatchCall::Pod(patch) => Some(patch),
                PatchCall::Deployment(_) => None,
            })
            .collect()
    }

    pub fn deployment_patches(&self) -> Vec<DeploymentPatch> {
        self.patches()
            .into_iter()
            .filter_map(|p| match p {
                PatchCall::Deployment(patch) => Some(patch),
                PatchCall::Pod(_) => None,
            })
            .collect()
    }

    /// Highest number of pod-listing/patch calls that overlapped in time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
        InFlightGuard(&self.in_flight)
    }

    fn record(&self, call: PatchCall) {
        if let Ok(mut patches) = self.patches.lock() {
            patches.push(call);
        }
    }

    fn check_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        if self.failing_namespaces.contains(namespace) {
            return Err(ClusterError::Forbidden(format!(
                "namespace {} is not readable",
                namespace
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for InMemoryClusterClient {
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        if self.namespace_listing_fails {
            return Err(ClusterError::Timeout("listing namespaces".to_string()));
        }
        Ok(self.namespaces.clone())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
        self.check_namespace(namespace)?;
        Ok(self.deployments.get(namespace).cloned().unwrap_or_default())
    }

    async fn list_pods_for_deployment(
        &self,
        deployment: &Deployment,
    ) -> Result<Vec<Pod>, ClusterError> {
        let _guard = self.enter().await;
        if self.failing_deployment_listings.contains(&deployment.name) {
            return Err(ClusterError::Api {
                code: 500,
                message: format!("pods of {} unavailable", deployment.name),
            });
        }
        Ok(self
            .pods
            .iter()
            .filter(|pod| deployment.selects(pod))
            .cloned()
            .collect())
    }

    async fn list_resource_bounds(
        &self,
        namespace: &str,
    ) -> Result<Vec<ResourceBoundDeclaration>, ClusterError> {
        self.check_namespace(namespace)?;
        Ok(self.bounds.get(namespace).cloned().unwrap_or_default())
    }

    async fn patch_pod(&self, patch: &PodPatch) -> Result<(), ClusterError> {
        let _guard = self.enter().await;
        if self.failing_pod_patches.contains(&patch.name) {
            return Err(ClusterError::Conflict(format!("pod {} changed", patch.name)));
        }
        self.record(PatchCall::Pod(patch.clone()));
        Ok(())
    }

    async fn patch_deployment(&self, patch: &DeploymentPatch) -> Result<(), ClusterError> {
        let _guard = self.enter().await;
        if self.failing_deployment_patches.contains(&patch.name) {
            return Err(ClusterError::Conflict(format!(
                "deployment {} changed",
                patch.name
            )));
        }
        self.record(PatchCall::Deployment(patch.clone()));
        Ok(())
    }

    async fn scrape_feature_gates(&self) -> Result<String, ClusterError> {
        self.metrics_text
            .clone()
            .ok_or_else(|| ClusterError::Forbidden("/metrics".to_string()))
    }
}
