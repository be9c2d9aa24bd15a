//! Rightsizer - workload request rightsizing loop
//!
//! Runs as a Deployment in the cluster, rewriting container resource
//! requests toward the recommendation API's targets on a fixed interval.

use anyhow::{Context, Result};
use rightsizer_lib::{
    health::components, CachedRecommendationProvider, ClusterClient, ClusterWalker,
    HealthRegistry, HttpRecommendationProvider, KubeClusterClient, RecommendationProvider,
    RightsizerMetrics, StaticRecommendationProvider,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rightsizer::api;
use rightsizer::config::{AgentConfig, ProviderKind};

const RIGHTSIZER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = RIGHTSIZER_VERSION, "Starting rightsizer");

    let config = AgentConfig::load()?;
    info!(
        cluster = %config.cluster_name,
        provider = ?config.provider,
        run_interval_secs = config.run_interval_secs,
        max_concurrent_deployments = config.max_concurrent_deployments,
        dry_run = config.dry_run,
        "Rightsizer configured"
    );

    let cluster = build_cluster_client(&config).await?;
    let provider = build_provider(&config)?;
    let walker = Arc::new(ClusterWalker::new(
        cluster,
        provider,
        config.walker_config(),
    ));

    let health_registry = HealthRegistry::for_interval(config.run_interval());
    health_registry.register(components::CLUSTER).await;
    health_registry.register(components::RECOMMENDATIONS).await;

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        RightsizerMetrics::new(),
    ));

    if config.run_once {
        run_once(&walker, &health_registry).await;
        return Ok(());
    }

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));
    let mut interval = tokio::time::interval(config.run_interval());

    loop {
        tokio::select! {
            _ = interval.tick() => run_once(&walker, &health_registry).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    api_handle.abort();
    info!("Shutting down");

    Ok(())
}

/// The kube client is built once and shared by every run
async fn build_cluster_client(config: &AgentConfig) -> Result<Arc<dyn ClusterClient>> {
    let client = match &config.kubeconfig {
        Some(path) => KubeClusterClient::from_kubeconfig(path)
            .await
            .with_context(|| format!("Failed to load kubeconfig {}", path.display()))?,
        None => KubeClusterClient::try_default()
            .await
            .context("Failed to infer cluster configuration")?,
    };
    Ok(Arc::new(client))
}

fn build_provider(config: &AgentConfig) -> Result<Arc<dyn RecommendationProvider>> {
    let inner: Arc<dyn RecommendationProvider> = match config.provider {
        ProviderKind::Static => {
            warn!("Using the built-in static recommendations");
            Arc::new(StaticRecommendationProvider::opencost_demo())
        }
        ProviderKind::Http => {
            info!(url = %config.recommendation_api_url, "Using the recommendation API");
            Arc::new(HttpRecommendationProvider::new(&config.recommendation_api_url)?)
        }
    };
    Ok(Arc::new(CachedRecommendationProvider::new(
        inner,
        config.cache_ttl(),
    )))
}

async fn run_once(walker: &Arc<ClusterWalker>, health: &HealthRegistry) {
    match walker.run().await {
        Ok(summary) => {
            info!(
                namespaces = summary.namespaces_visited,
                deployments = summary.deployments_visited,
                applied = summary.applied(),
                failed = summary.failed(),
                planned = summary.planned(),
                "Rightsizing run completed"
            );
            health.record_run_success().await;
        }
        Err(e) => {
            error!(error = %e, "Rightsizing run failed");
            health.record_run_failure(e.to_string()).await;
        }
    }
}
