use super::*;
use crate::cluster::InMemoryClusterClient;
use crate::models::{Container, Pod, ResourceBoundDeclaration, ResourceRecommendation, ResourceRequests};
use crate::recommendations::StaticRecommendationProvider;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

fn labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), app.to_string())])
}

fn container(name: &str) -> Container {
    Container {
        name: name.to_string(),
        requests: ResourceRequests::default(),
    }
}

fn deployment(namespace: &str, name: &str) -> Deployment {
    Deployment {
        name: name.to_string(),
        namespace: namespace.to_string(),
        pod_selector: labels(name),
        template_containers: vec![container(name)],
    }
}

fn pod(namespace: &str, app: &str, name: &str) -> Pod {
    Pod {
        name: name.to_string(),
        namespace: namespace.to_string(),
        labels: labels(app),
        containers: vec![container(app)],
    }
}

fn opencost_cluster() -> InMemoryClusterClient {
    InMemoryClusterClient::new()
        .with_deployment(deployment("opencost", "opencost"))
        .with_pod(pod("opencost", "opencost", "opencost-1234"))
}

fn expected_requests() -> ResourceRequests {
    ResourceRequests {
        cpu: Some("320m".to_string()),
        memory: Some("70Mi".to_string()),
    }
}

fn recommendation() -> ResourceRecommendation {
    ResourceRecommendation {
        cpu: Some(Decimal::new(32, 2)),
        memory: Some(Decimal::from(73_401_320u64)),
    }
}

fn walker(
    cluster: Arc<InMemoryClusterClient>,
    provider: StaticRecommendationProvider,
    config: WalkerConfig,
) -> Arc<ClusterWalker> {
    Arc::new(ClusterWalker::new(cluster, Arc::new(provider), config))
}

#[tokio::test]
async fn test_in_place_resize_patches_pod_and_deployment() {
    let cluster = Arc::new(opencost_cluster().with_in_place_resize(true));
    let walker = walker(
        cluster.clone(),
        StaticRecommendationProvider::opencost_demo(),
        WalkerConfig::default(),
    );

    let summary = walker.run().await.unwrap();

    let pod_patches = cluster.pod_patches();
    assert_eq!(pod_patches.len(), 1);
    assert_eq!(pod_patches[0].name, "opencost-1234");
    assert_eq!(
        pod_patches[0].to_patch_body(),
        serde_json::json!({
            "spec": {"containers": [{
                "name": "opencost",
                "resources": {"requests": {"cpu": "320m", "memory": "70Mi"}}
            }]}
        })
    );

    let deployment_patches = cluster.deployment_patches();
    assert_eq!(deployment_patches.len(), 1);
    assert_eq!(deployment_patches[0].name, "opencost");
    assert_eq!(deployment_patches[0].containers[0].requests, expected_requests());

    assert!(summary.in_place_resize);
    assert_eq!(summary.applied(), 2);
    assert_eq!(summary.failed(), 0);
    assert_eq!(summary.deployments_visited, 1);
}

#[tokio::test]
async fn test_without_in_place_resize_only_deployment_is_patched() {
    let cluster = Arc::new(opencost_cluster().with_in_place_resize(false));
    let walker = walker(
        cluster.clone(),
        StaticRecommendationProvider::opencost_demo(),
        WalkerConfig::default(),
    );

    let summary = walker.run().await.unwrap();

    assert!(cluster.pod_patches().is_empty());
    assert_eq!(cluster.deployment_patches().len(), 1);
    assert!(!summary.in_place_resize);
    assert_eq!(summary.patches.len(), 1);
    assert_eq!(summary.patches[0].kind, PatchKind::Deployment);
}

#[tokio::test]
async fn test_unreadable_feature_gates_disable_in_place_resize() {
    // No metrics text: the scrape fails with Forbidden
    let cluster = Arc::new(opencost_cluster());
    let walker = walker(
        cluster.clone(),
        StaticRecommendationProvider::opencost_demo(),
        WalkerConfig::default(),
    );

    walker.run().await.unwrap();

    assert!(cluster.pod_patches().is_empty());
    assert_eq!(cluster.deployment_patches().len(), 1);
}

#[tokio::test]
async fn test_forced_in_place_resize_skips_detection() {
    let cluster = Arc::new(opencost_cluster());
    let config = WalkerConfig {
        in_place_resize: InPlaceResizeMode::Enabled,
        ..WalkerConfig::default()
    };
    let walker = walker(cluster.clone(), StaticRecommendationProvider::opencost_demo(), config);

    walker.run().await.unwrap();

    assert_eq!(cluster.pod_patches().len(), 1);
}

#[tokio::test]
async fn test_deployment_concurrency_is_capped() {
    let mut cluster = InMemoryClusterClient::new()
        .with_in_place_resize(false)
        .with_call_delay(Duration::from_millis(20));
    let mut provider = StaticRecommendationProvider::default();
    for i in 0..12 {
        let name = format!("app-{}", i);
        cluster = cluster.with_deployment(deployment("apps", &name));
        provider = provider
            .with_policy("apps", &name, Some(0.1))
            .with_recommendation("apps", &name, &name, recommendation());
    }
    let cluster = Arc::new(cluster);
    let config = WalkerConfig {
        max_concurrent_deployments: 3,
        ..WalkerConfig::default()
    };
    let walker = walker(cluster.clone(), provider, config);

    let summary = walker.run().await.unwrap();

    assert_eq!(cluster.deployment_patches().len(), 12);
    assert_eq!(summary.deployments_visited, 12);
    assert!(cluster.peak_in_flight() >= 1);
    assert!(cluster.peak_in_flight() <= 3);
}

#[tokio::test]
async fn test_single_permit_serialises_deployments() {
    let cluster = Arc::new(
        InMemoryClusterClient::new()
            .with_in_place_resize(false)
            .with_call_delay(Duration::from_millis(10))
            .with_deployment(deployment("apps", "api"))
            .with_deployment(deployment("apps", "worker")),
    );
    let provider = StaticRecommendationProvider::default()
        .with_policy("apps", "api", None)
        .with_policy("apps", "worker", None)
        .with_recommendation("apps", "api", "api", recommendation())
        .with_recommendation("apps", "worker", "worker", recommendation());
    let config = WalkerConfig {
        max_concurrent_deployments: 1,
        ..WalkerConfig::default()
    };

    walker(cluster.clone(), provider, config).run().await.unwrap();

    assert_eq!(cluster.deployment_patches().len(), 2);
    assert_eq!(cluster.peak_in_flight(), 1);
}

#[tokio::test]
async fn test_pod_patch_failure_is_isolated() {
    let cluster = Arc::new(
        opencost_cluster()
            .with_pod(pod("opencost", "opencost", "opencost-5678"))
            .with_in_place_resize(true)
            .fail_pod_patch("opencost-1234"),
    );
    let walker = walker(
        cluster.clone(),
        StaticRecommendationProvider::opencost_demo(),
        WalkerConfig::default(),
    );

    let summary = walker.run().await.unwrap();

    let patched: Vec<_> = cluster.pod_patches().into_iter().map(|p| p.name).collect();
    assert_eq!(patched, vec!["opencost-5678".to_string()]);
    assert_eq!(cluster.deployment_patches().len(), 1);

    assert_eq!(summary.applied(), 2);
    assert_eq!(summary.failed(), 1);
    let failed = summary
        .patches
        .iter()
        .find(|p| matches!(p.outcome, PatchOutcome::Failed(_)))
        .unwrap();
    assert_eq!(failed.kind, PatchKind::Pod);
    assert_eq!(failed.name, "opencost-1234");
    // A failed patch does not count the deployment as failed
    assert_eq!(summary.deployments_failed, 0);
}

#[tokio::test]
async fn test_deployment_patch_failure_does_not_stop_siblings() {
    let cluster = Arc::new(
        InMemoryClusterClient::new()
            .with_in_place_resize(false)
            .with_deployment(deployment("apps", "api"))
            .with_deployment(deployment("apps", "worker"))
            .fail_deployment_patch("api"),
    );
    let provider = StaticRecommendationProvider::default()
        .with_policy("apps", "api", None)
        .with_policy("apps", "worker", None)
        .with_recommendation("apps", "api", "api", recommendation())
        .with_recommendation("apps", "worker", "worker", recommendation());

    let summary = walker(cluster.clone(), provider, WalkerConfig::default())
        .run()
        .await
        .unwrap();

    let patched: Vec<_> = cluster
        .deployment_patches()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(patched, vec!["worker".to_string()]);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.applied(), 1);
}

#[tokio::test]
async fn test_pod_listing_failure_still_patches_template() {
    let cluster = Arc::new(
        opencost_cluster()
            .with_in_place_resize(true)
            .fail_pod_listing("opencost"),
    );
    let walker = walker(
        cluster.clone(),
        StaticRecommendationProvider::opencost_demo(),
        WalkerConfig::default(),
    );

    let summary = walker.run().await.unwrap();

    assert!(cluster.pod_patches().is_empty());
    assert_eq!(cluster.deployment_patches().len(), 1);
    assert_eq!(summary.deployments_failed, 1);
}

#[tokio::test]
async fn test_namespace_listing_failure_is_isolated() {
    let cluster = Arc::new(
        opencost_cluster()
            .with_in_place_resize(false)
            .with_deployment(deployment("payments", "ledger"))
            .fail_namespace("payments"),
    );
    let provider = StaticRecommendationProvider::opencost_demo()
        .with_policy("payments", "ledger", Some(0.1))
        .with_recommendation("payments", "ledger", "ledger", recommendation());

    let summary = walker(cluster.clone(), provider, WalkerConfig::default())
        .run()
        .await
        .unwrap();

    let patched: Vec<_> = cluster
        .deployment_patches()
        .into_iter()
        .map(|p| p.namespace)
        .collect();
    assert_eq!(patched, vec!["opencost".to_string()]);
    assert_eq!(summary.namespaces_visited, 2);
    assert_eq!(summary.namespaces_failed, 1);
}

#[tokio::test]
async fn test_unconfigured_namespace_is_not_listed() {
    // Listing "kube-system" would fail; it has no policy, so it is never listed
    let cluster = Arc::new(
        opencost_cluster()
            .with_in_place_resize(false)
            .with_deployment(deployment("kube-system", "coredns"))
            .fail_namespace("kube-system"),
    );
    let walker = walker(
        cluster.clone(),
        StaticRecommendationProvider::opencost_demo(),
        WalkerConfig::default(),
    );

    let summary = walker.run().await.unwrap();

    assert_eq!(summary.namespaces_visited, 2);
    assert_eq!(summary.namespaces_failed, 0);
    assert_eq!(cluster.deployment_patches().len(), 1);
}

#[tokio::test]
async fn test_unconfigured_deployment_is_ignored() {
    let cluster = Arc::new(
        opencost_cluster()
            .with_in_place_resize(false)
            .with_deployment(deployment("opencost", "prometheus")),
    );
    let provider = StaticRecommendationProvider::opencost_demo().with_recommendation(
        "opencost",
        "prometheus",
        "prometheus",
        recommendation(),
    );

    let summary = walker(cluster.clone(), provider, WalkerConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(summary.deployments_visited, 1);
    let patched: Vec<_> = cluster
        .deployment_patches()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(patched, vec!["opencost".to_string()]);
}

#[tokio::test]
async fn test_out_of_bounds_recommendation_is_never_patched() {
    let bounds = ResourceBoundDeclaration {
        kind: "Container".to_string(),
        min: BTreeMap::new(),
        max: BTreeMap::from([("cpu".to_string(), "200m".to_string())]),
    };
    let cluster = Arc::new(
        opencost_cluster()
            .with_in_place_resize(true)
            .with_bounds("opencost", bounds),
    );
    let walker = walker(
        cluster.clone(),
        StaticRecommendationProvider::opencost_demo(),
        WalkerConfig::default(),
    );

    let summary = walker.run().await.unwrap();

    assert!(cluster.patches().is_empty());
    assert!(summary.patches.is_empty());
}

#[tokio::test]
async fn test_requests_already_at_recommendation_are_left_alone() {
    let mut deployment = deployment("opencost", "opencost");
    deployment.template_containers[0].requests = expected_requests();
    let cluster = Arc::new(
        InMemoryClusterClient::new()
            .with_in_place_resize(false)
            .with_deployment(deployment),
    );
    let walker = walker(
        cluster.clone(),
        StaticRecommendationProvider::opencost_demo(),
        WalkerConfig::default(),
    );

    let summary = walker.run().await.unwrap();

    assert!(cluster.patches().is_empty());
    assert!(summary.patches.is_empty());
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    let cluster = Arc::new(opencost_cluster().with_in_place_resize(true));
    let config = WalkerConfig {
        dry_run: true,
        ..WalkerConfig::default()
    };
    let walker = walker(cluster.clone(), StaticRecommendationProvider::opencost_demo(), config);

    let summary = walker.run().await.unwrap();

    assert!(cluster.patches().is_empty());
    assert_eq!(summary.planned(), 2);
    assert_eq!(summary.applied(), 0);
    assert!(summary
        .patches
        .iter()
        .all(|p| p.containers[0].requests == expected_requests()));
}

#[tokio::test]
async fn test_namespace_listing_failure_fails_run() {
    let cluster = Arc::new(opencost_cluster().fail_namespace_listing());
    let walker = walker(
        cluster,
        StaticRecommendationProvider::opencost_demo(),
        WalkerConfig::default(),
    );

    match walker.run().await {
        Err(RightsizingError::Listing {
            resource, namespace, ..
        }) => {
            assert_eq!(resource, "namespaces");
            assert!(namespace.is_none());
        }
        other => panic!("expected listing error, got {:?}", other),
    }
}

/// Serves the wrapped provider except for one namespace's recommendations
struct FailingNamespace {
    inner: StaticRecommendationProvider,
    namespace: &'static str,
}

#[crate::recommendations::async_trait]
impl RecommendationProvider for FailingNamespace {
    async fn get_policies(&self) -> Result<PolicyMap, crate::error::ProviderError> {
        self.inner.get_policies().await
    }

    async fn get_recommendations(
        &self,
        namespace: &str,
    ) -> Result<crate::models::NamespaceRecommendations, crate::error::ProviderError> {
        if namespace == self.namespace {
            return Err(crate::error::ProviderError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.inner.get_recommendations(namespace).await
    }
}

#[tokio::test]
async fn test_recommendation_failure_is_isolated() {
    let cluster = Arc::new(
        opencost_cluster()
            .with_in_place_resize(false)
            .with_deployment(deployment("payments", "ledger")),
    );
    let provider = FailingNamespace {
        inner: StaticRecommendationProvider::opencost_demo()
            .with_policy("payments", "ledger", Some(0.1))
            .with_recommendation("payments", "ledger", "ledger", recommendation()),
        namespace: "payments",
    };
    let walker = Arc::new(ClusterWalker::new(
        cluster.clone(),
        Arc::new(provider),
        WalkerConfig::default(),
    ));

    let summary = walker.run().await.unwrap();

    let patched: Vec<_> = cluster
        .deployment_patches()
        .into_iter()
        .map(|p| p.namespace)
        .collect();
    assert_eq!(patched, vec!["opencost".to_string()]);
    assert_eq!(summary.deployments_visited, 2);
    assert_eq!(summary.deployments_failed, 1);
    assert_eq!(summary.applied(), 1);
}
