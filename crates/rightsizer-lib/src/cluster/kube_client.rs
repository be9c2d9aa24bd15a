//! kube-rs implementation of [`ClusterClient`]

use super::{async_trait, ClusterClient};
use crate::error::ClusterError;
use crate::models::{
    Container, Deployment, DeploymentPatch, Pod, PodPatch, ResourceBoundDeclaration,
    ResourceRequests,
};
use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::Deployment as KubeDeployment;
use k8s_openapi::api::core::v1::{
    Container as KubeContainer, LimitRange, Namespace, Pod as KubePod,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Field manager recorded on every patch
const FIELD_MANAGER: &str = "rightsizer";

/// Cluster client backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Infer configuration from the environment (in-cluster service account
    /// first, then the local kubeconfig)
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to infer Kubernetes client configuration")?;
        Ok(Self::new(client))
    }

    /// Build a client from an explicit kubeconfig file
    pub async fn from_kubeconfig(path: &Path) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("Failed to load kubeconfig")?;
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        info!(path = %path.display(), "Using kubeconfig");
        Ok(Self::new(client))
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PatchParams::default()
        }
    }
}

fn quantities(map: Option<&BTreeMap<String, Quantity>>) -> BTreeMap<String, String> {
    map.map(|m| m.iter().map(|(k, q)| (k.clone(), q.0.clone())).collect())
        .unwrap_or_default()
}

fn to_container(container: &KubeContainer) -> Container {
    let requests = container
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref());
    let lookup = |key: &str| requests.and_then(|r| r.get(key)).map(|q| q.0.clone());

    Container {
        name: container.name.clone(),
        requests: ResourceRequests {
            cpu: lookup("cpu"),
            memory: lookup("memory"),
        },
    }
}

fn to_deployment(deployment: &KubeDeployment) -> Deployment {
    let spec = deployment.spec.as_ref();
    Deployment {
        name: deployment.name_any(),
        namespace: deployment.namespace().unwrap_or_default(),
        pod_selector: spec
            .and_then(|s| s.selector.match_labels.clone())
            .unwrap_or_default(),
        template_containers: spec
            .and_then(|s| s.template.spec.as_ref())
            .map(|pod_spec| pod_spec.containers.iter().map(to_container).collect())
            .unwrap_or_default(),
    }
}

fn to_pod(pod: &KubePod) -> Pod {
    Pod {
        name: pod.name_any(),
        namespace: pod.namespace().unwrap_or_default(),
        labels: pod.labels().clone(),
        containers: pod
            .spec
            .as_ref()
            .map(|s| s.containers.iter().map(to_container).collect())
            .unwrap_or_default(),
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(|ns| ns.name_any()).collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
        let api: Api<KubeDeployment> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items.iter().map(to_deployment).collect())
    }

    async fn list_pods_for_deployment(
        &self,
        deployment: &Deployment,
    ) -> Result<Vec<Pod>, ClusterError> {
        let Some(selector) = deployment.label_selector() else {
            warn!(
                namespace = %deployment.namespace,
                deployment = %deployment.name,
                "Deployment has an empty selector, not listing pods"
            );
            return Ok(Vec::new());
        };

        let api: Api<KubePod> = Api::namespaced(self.client.clone(), &deployment.namespace);
        let list = api.list(&ListParams::default().labels(&selector)).await?;
        debug!(
            namespace = %deployment.namespace,
            deployment = %deployment.name,
            selector = %selector,
            pods = list.items.len(),
            "Listed deployment pods"
        );
        Ok(list.items.iter().map(to_pod).collect())
    }

    async fn list_resource_bounds(
        &self,
        namespace: &str,
    ) -> Result<Vec<ResourceBoundDeclaration>, ClusterError> {
        let api: Api<LimitRange> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;

        let declarations = list
            .items
            .iter()
            .filter_map(|lr| lr.spec.as_ref())
            .flat_map(|spec| spec.limits.iter())
            .map(|item| ResourceBoundDeclaration {
                kind: item.type_.clone(),
                min: quantities(item.min.as_ref()),
                max: quantities(item.max.as_ref()),
            })
            .collect();
        Ok(declarations)
    }

    async fn patch_pod(&self, patch: &PodPatch) -> Result<(), ClusterError> {
        let api: Api<KubePod> = Api::namespaced(self.client.clone(), &patch.namespace);
        api.patch(
            &patch.name,
            &Self::patch_params(),
            &Patch::Strategic(patch.to_patch_body()),
        )
        .await?;
        Ok(())
    }

    async fn patch_deployment(&self, patch: &DeploymentPatch) -> Result<(), ClusterError> {
        let api: Api<KubeDeployment> = Api::namespaced(self.client.clone(), &patch.namespace);
        api.patch(
            &patch.name,
            &Self::patch_params(),
            &Patch::Strategic(patch.to_patch_body()),
        )
        .await?;
        Ok(())
    }

    async fn scrape_feature_gates(&self) -> Result<String, ClusterError> {
        let request = http::Request::get("/metrics")
            .body(Vec::new())
            .map_err(|e| ClusterError::Transport(e.to_string()))?;
        let body = self.client.request_text(request).await?;
        Ok(body)
    }
}
