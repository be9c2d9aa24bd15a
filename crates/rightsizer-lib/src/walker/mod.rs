//! Cluster walker
//!
//! One run walks namespaces -> configured deployments -> pods:
//!
//! - namespaces fan out without a bound;
//! - deployments are processed under a shared semaphore
//!   (`max_concurrent_deployments`);
//! - patches for the pods of one deployment are dispatched concurrently.
//!
//! Listing failures abort only the branch that raised them. Patch failures
//! are logged with their body and recorded in the [`RunSummary`].

use crate::bounds::{BoundsMergeStrategy, BoundsResolver, ContainerBoundRange};
use crate::cache::DEFAULT_CACHE_TTL;
use crate::cluster::ClusterClient;
use crate::decision::{plan_containers, ContainerPlan};
use crate::error::{ClusterError, RightsizingError};
use crate::feature_gates::{FeatureGateDetector, InPlaceResizeMode};
use crate::models::{
    ContainerPatch, ContainerRecommendation, Deployment, DeploymentPatch, PodPatch, PolicyMap,
};
use crate::observability::{RightsizerMetrics, StructuredLogger};
use crate::recommendations::RecommendationProvider;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

#[cfg(test)]
mod tests;

/// Default cap on deployments processed at once
pub const DEFAULT_MAX_CONCURRENT_DEPLOYMENTS: usize = 10;

/// Walker configuration
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    pub max_concurrent_deployments: usize,
    /// Compute and record patches without sending them
    pub dry_run: bool,
    pub bounds_strategy: BoundsMergeStrategy,
    pub in_place_resize: InPlaceResizeMode,
    /// TTL of the bound-range and feature-gate caches
    pub cache_ttl: Duration,
    /// Name attached to every structured log event
    pub cluster_name: String,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_deployments: DEFAULT_MAX_CONCURRENT_DEPLOYMENTS,
            dry_run: false,
            bounds_strategy: BoundsMergeStrategy::default(),
            in_place_resize: InPlaceResizeMode::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cluster_name: "default".to_string(),
        }
    }
}

/// What a patch was sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Pod,
    Deployment,
}

impl PatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchKind::Pod => "pod",
            PatchKind::Deployment => "deployment",
        }
    }
}

impl std::fmt::Display for PatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    DryRun,
    /// Rejected by the cluster; carries the error text
    Failed(String),
}

impl PatchOutcome {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            PatchOutcome::Applied => "applied",
            PatchOutcome::DryRun => "dry_run",
            PatchOutcome::Failed(_) => "failed",
        }
    }
}

/// One dispatched (or planned) patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    pub kind: PatchKind,
    pub namespace: String,
    pub name: String,
    pub containers: Vec<ContainerPatch>,
    pub outcome: PatchOutcome,
}

/// Result of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub namespaces_visited: usize,
    pub namespaces_failed: usize,
    pub deployments_visited: usize,
    pub deployments_failed: usize,
    pub in_place_resize: bool,
    pub patches: Vec<PatchRecord>,
}

impl RunSummary {
    pub fn applied(&self) -> usize {
        self.count(|o| *o == PatchOutcome::Applied)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PatchOutcome::Failed(_)))
    }

    pub fn planned(&self) -> usize {
        self.count(|o| *o == PatchOutcome::DryRun)
    }

    fn count(&self, pred: impl Fn(&PatchOutcome) -> bool) -> usize {
        self.patches.iter().filter(|p| pred(&p.outcome)).count()
    }

    fn absorb(&mut self, other: RunSummary) {
        self.namespaces_visited += other.namespaces_visited;
        self.namespaces_failed += other.namespaces_failed;
        self.deployments_visited += other.deployments_visited;
        self.deployments_failed += other.deployments_failed;
        self.patches.extend(other.patches);
    }
}

/// Outcome of one deployment: the patches attempted, plus the first error
/// that cut part of its processing short
struct DeploymentOutcome {
    patches: Vec<PatchRecord>,
    error: Option<RightsizingError>,
}

/// Drives a rightsizing run over the whole cluster
pub struct ClusterWalker {
    cluster: Arc<dyn ClusterClient>,
    provider: Arc<dyn RecommendationProvider>,
    bounds: BoundsResolver,
    feature_gates: FeatureGateDetector,
    config: WalkerConfig,
    semaphore: Arc<Semaphore>,
    metrics: RightsizerMetrics,
    logger: StructuredLogger,
}

impl ClusterWalker {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        provider: Arc<dyn RecommendationProvider>,
        config: WalkerConfig,
    ) -> Self {
        let bounds = BoundsResolver::new(cluster.clone(), config.bounds_strategy, config.cache_ttl);
        let feature_gates =
            FeatureGateDetector::new(cluster.clone(), config.in_place_resize, config.cache_ttl);
        // A zero-permit semaphore would deadlock the run
        let permits = config.max_concurrent_deployments.max(1);

        Self {
            cluster,
            provider,
            bounds,
            feature_gates,
            semaphore: Arc::new(Semaphore::new(permits)),
            metrics: RightsizerMetrics::new(),
            logger: StructuredLogger::new(config.cluster_name.clone()),
            config,
        }
    }

    pub fn config(&self) -> &WalkerConfig {
        &self.config
    }

    /// Run once over every namespace
    ///
    /// Fails only when the policy map or the namespace list cannot be read.
    pub async fn run(self: &Arc<Self>) -> Result<RunSummary, RightsizingError> {
        let started = Instant::now();
        self.logger
            .log_run_started(self.config.dry_run, self.config.max_concurrent_deployments);

        let policies = Arc::new(self.provider.get_policies().await?);
        let in_place_resize = self.feature_gates.in_place_resize_enabled().await;
        self.metrics.set_in_place_resize(in_place_resize);

        let namespaces = self
            .cluster
            .list_namespaces()
            .await
            .map_err(|e| self.listing_error("namespaces", None, e))?;

        let mut tasks = JoinSet::new();
        for namespace in namespaces {
            let walker = Arc::clone(self);
            let policies = Arc::clone(&policies);
            tasks.spawn(async move {
                walker
                    .process_namespace(namespace, policies, in_place_resize)
                    .await
            });
        }

        let mut summary = RunSummary {
            in_place_resize,
            ..RunSummary::default()
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(namespace_summary) => summary.absorb(namespace_summary),
                Err(e) => {
                    error!(error = %e, "Namespace task panicked");
                    summary.namespaces_visited += 1;
                    summary.namespaces_failed += 1;
                }
            }
        }

        let elapsed = started.elapsed();
        self.metrics.observe_run_duration(elapsed.as_secs_f64());
        self.logger.log_run_finished(
            summary.namespaces_visited,
            summary.deployments_visited,
            summary.applied(),
            summary.failed(),
            elapsed.as_millis(),
        );

        Ok(summary)
    }

    async fn process_namespace(
        self: Arc<Self>,
        namespace: String,
        policies: Arc<PolicyMap>,
        in_place_resize: bool,
    ) -> RunSummary {
        let mut summary = RunSummary {
            namespaces_visited: 1,
            ..RunSummary::default()
        };

        let configured = match policies.get(&namespace) {
            Some(configured) if !configured.is_empty() => configured,
            _ => {
                debug!(namespace = %namespace, "No configured deployments, skipping namespace");
                return summary;
            }
        };

        let deployments = match self.cluster.list_deployments(&namespace).await {
            Ok(deployments) => deployments,
            Err(e) => {
                self.listing_error("deployments", Some(&namespace), e);
                summary.namespaces_failed = 1;
                return summary;
            }
        };

        let mut tasks = JoinSet::new();
        for deployment in deployments {
            let Some(config) = configured.get(&deployment.name) else {
                continue;
            };
            let threshold = config.threshold();
            let walker = Arc::clone(&self);

            tasks.spawn(async move {
                let name = deployment.name.clone();
                // Permits are released on drop, including when processing fails
                let Ok(_permit) = walker.semaphore.acquire().await else {
                    return (name, None);
                };

                walker.metrics.deployment_started();
                let outcome = walker
                    .process_deployment(&deployment, threshold, in_place_resize)
                    .await;
                walker.metrics.deployment_finished();
                (name, Some(outcome))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            summary.deployments_visited += 1;
            match joined {
                Ok((name, None)) => {
                    error!(namespace = %namespace, deployment = %name, "Walker semaphore closed");
                    summary.deployments_failed += 1;
                }
                Ok((name, Some(outcome))) => {
                    if let Some(e) = outcome.error {
                        debug!(
                            namespace = %namespace,
                            deployment = %name,
                            error = %e,
                            "Deployment processed with errors"
                        );
                        summary.deployments_failed += 1;
                    }
                    summary.patches.extend(outcome.patches);
                }
                Err(e) => {
                    error!(namespace = %namespace, error = %e, "Deployment task panicked");
                    summary.deployments_failed += 1;
                }
            }
        }

        summary
    }

    async fn process_deployment(
        &self,
        deployment: &Deployment,
        threshold: f64,
        in_place_resize: bool,
    ) -> DeploymentOutcome {
        let mut outcome = DeploymentOutcome {
            patches: Vec::new(),
            error: None,
        };

        let (recommendations, bounds) = match self.load_inputs(deployment).await {
            Ok(Some(inputs)) => inputs,
            Ok(None) => {
                debug!(
                    namespace = %deployment.namespace,
                    deployment = %deployment.name,
                    "No recommendations for deployment"
                );
                return outcome;
            }
            Err(e) => {
                outcome.error = Some(e);
                return outcome;
            }
        };

        if in_place_resize {
            match self
                .patch_pods(deployment, &recommendations, &bounds, threshold)
                .await
            {
                Ok(records) => outcome.patches.extend(records),
                Err(e) => outcome.error = Some(e),
            }
        }

        let plan = plan_containers(
            &deployment.template_containers,
            &recommendations,
            &bounds,
            threshold,
        );
        self.log_skipped(&deployment.namespace, &deployment.name, &plan);
        if !plan.is_empty() {
            let patch = DeploymentPatch {
                name: deployment.name.clone(),
                namespace: deployment.namespace.clone(),
                containers: plan.patches,
            };
            outcome.patches.push(self.dispatch_deployment_patch(patch).await);
        }

        outcome
    }

    /// Recommendations and bounds for one deployment, fetched once and shared
    /// by the pod and template stages
    async fn load_inputs(
        &self,
        deployment: &Deployment,
    ) -> Result<Option<(HashMap<String, ContainerRecommendation>, ContainerBoundRange)>, RightsizingError>
    {
        let mut namespace_recommendations = match self
            .provider
            .get_recommendations(&deployment.namespace)
            .await
        {
            Ok(recommendations) => recommendations,
            Err(e) => {
                self.metrics.inc_listing_error("recommendations");
                self.logger.log_recommendations_failed(
                    &deployment.namespace,
                    &deployment.name,
                    &e.to_string(),
                );
                return Err(e.into());
            }
        };
        let Some(recommendations) = namespace_recommendations.remove(&deployment.name) else {
            return Ok(None);
        };

        let bounds = match self
            .bounds
            .resolve_container_bounds(&deployment.namespace)
            .await
        {
            Ok(bounds) => bounds,
            Err(e) => {
                self.metrics.inc_listing_error("limitranges");
                self.logger
                    .log_listing_failed(&deployment.namespace, &e.to_string());
                return Err(e);
            }
        };

        Ok(Some((recommendations, bounds)))
    }

    async fn patch_pods(
        &self,
        deployment: &Deployment,
        recommendations: &HashMap<String, ContainerRecommendation>,
        bounds: &ContainerBoundRange,
        threshold: f64,
    ) -> Result<Vec<PatchRecord>, RightsizingError> {
        let pods = self
            .cluster
            .list_pods_for_deployment(deployment)
            .await
            .map_err(|e| self.listing_error("pods", Some(&deployment.namespace), e))?;

        let mut patches = Vec::new();
        for pod in pods {
            let plan = plan_containers(&pod.containers, recommendations, bounds, threshold);
            self.log_skipped(&pod.namespace, &pod.name, &plan);
            if !plan.is_empty() {
                patches.push(PodPatch {
                    name: pod.name,
                    namespace: pod.namespace,
                    containers: plan.patches,
                });
            }
        }

        let dispatches = patches
            .into_iter()
            .map(|patch| self.dispatch_pod_patch(patch));
        Ok(futures::future::join_all(dispatches).await)
    }

    async fn dispatch_pod_patch(&self, patch: PodPatch) -> PatchRecord {
        let body = patch.to_patch_body().to_string();
        let result = if self.config.dry_run {
            None
        } else {
            Some(self.cluster.patch_pod(&patch).await)
        };
        self.record_patch(
            PatchKind::Pod,
            patch.namespace,
            patch.name,
            patch.containers,
            &body,
            result,
        )
    }

    async fn dispatch_deployment_patch(&self, patch: DeploymentPatch) -> PatchRecord {
        let body = patch.to_patch_body().to_string();
        let result = if self.config.dry_run {
            None
        } else {
            Some(self.cluster.patch_deployment(&patch).await)
        };
        self.record_patch(
            PatchKind::Deployment,
            patch.namespace,
            patch.name,
            patch.containers,
            &body,
            result,
        )
    }

    /// `result` is `None` in dry-run mode
    fn record_patch(
        &self,
        kind: PatchKind,
        namespace: String,
        name: String,
        containers: Vec<ContainerPatch>,
        body: &str,
        result: Option<Result<(), ClusterError>>,
    ) -> PatchRecord {
        let outcome = match result {
            None => {
                self.logger
                    .log_patch(kind.as_str(), &namespace, &name, body, true);
                PatchOutcome::DryRun
            }
            Some(Ok(())) => {
                self.logger
                    .log_patch(kind.as_str(), &namespace, &name, body, false);
                PatchOutcome::Applied
            }
            Some(Err(source)) => {
                let err = RightsizingError::Patch {
                    kind: kind.as_str(),
                    namespace: namespace.clone(),
                    name: name.clone(),
                    source,
                };
                self.logger.log_patch_failed(
                    kind.as_str(),
                    &namespace,
                    &name,
                    body,
                    &err.to_string(),
                );
                PatchOutcome::Failed(err.to_string())
            }
        };
        self.metrics.inc_patch(kind.as_str(), outcome.label());

        PatchRecord {
            kind,
            namespace,
            name,
            containers,
            outcome,
        }
    }

    fn log_skipped(&self, namespace: &str, owner: &str, plan: &ContainerPlan) {
        for (container, reason) in &plan.skipped {
            self.metrics.inc_container_skipped(reason.label());
            self.logger
                .log_container_skipped(namespace, owner, container, &reason.to_string());
        }
    }

    fn listing_error(
        &self,
        resource: &'static str,
        namespace: Option<&str>,
        source: ClusterError,
    ) -> RightsizingError {
        let err = RightsizingError::listing(resource, namespace, source);
        self.metrics.inc_listing_error(resource);
        self.logger
            .log_listing_failed(namespace.unwrap_or("<cluster>"), &err.to_string());
        err
    }
}
