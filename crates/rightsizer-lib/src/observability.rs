//! Observability infrastructure for the rightsizer
//!
//! Provides:
//! - Prometheus metrics (run latency, patch outcomes, skipped containers, listing errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for a full run (in seconds)
const RUN_DURATION_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RightsizerMetricsInner> = OnceLock::new();

struct RightsizerMetricsInner {
    run_duration_seconds: Histogram,
    patches_total: IntCounterVec,
    containers_skipped_total: IntCounterVec,
    listing_errors_total: IntCounterVec,
    deployments_in_flight: IntGauge,
    in_place_resize_enabled: IntGauge,
}

impl RightsizerMetricsInner {
    fn new() -> Self {
        Self {
            run_duration_seconds: register_histogram!(
                "rightsizer_run_duration_seconds",
                "Wall time of one full rightsizing run",
                RUN_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register run_duration_seconds"),

            patches_total: register_int_counter_vec!(
                "rightsizer_patches_total",
                "Patches by target kind and outcome",
                &["kind", "outcome"]
            )
            .expect("Failed to register patches_total"),

            containers_skipped_total: register_int_counter_vec!(
                "rightsizer_containers_skipped_total",
                "Containers with a recommendation that were not patched",
                &["reason"]
            )
            .expect("Failed to register containers_skipped_total"),

            listing_errors_total: register_int_counter_vec!(
                "rightsizer_listing_errors_total",
                "Cluster listings that failed",
                &["resource"]
            )
            .expect("Failed to register listing_errors_total"),

            deployments_in_flight: register_int_gauge!(
                "rightsizer_deployments_in_flight",
                "Deployments currently being processed"
            )
            .expect("Failed to register deployments_in_flight"),

            in_place_resize_enabled: register_int_gauge!(
                "rightsizer_in_place_resize_enabled",
                "1 when running pods are resized in place"
            )
            .expect("Failed to register in_place_resize_enabled"),
        }
    }
}

/// Rightsizer metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics; clones share the same series.
#[derive(Clone)]
pub struct RightsizerMetrics {
    _private: (),
}

impl Default for RightsizerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RightsizerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RightsizerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RightsizerMetricsInner {
        GLOBAL_METRICS.get_or_init(RightsizerMetricsInner::new)
    }

    pub fn observe_run_duration(&self, duration_secs: f64) {
        self.inner().run_duration_seconds.observe(duration_secs);
    }

    pub fn inc_patch(&self, kind: &str, outcome: &str) {
        self.inner()
            .patches_total
            .with_label_values(&[kind, outcome])
            .inc();
    }

    pub fn inc_container_skipped(&self, reason: &str) {
        self.inner()
            .containers_skipped_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_listing_error(&self, resource: &str) {
        self.inner()
            .listing_errors_total
            .with_label_values(&[resource])
            .inc();
    }

    pub fn deployment_started(&self) {
        self.inner().deployments_in_flight.inc();
    }

    pub fn deployment_finished(&self) {
        self.inner().deployments_in_flight.dec();
    }

    pub fn set_in_place_resize(&self, enabled: bool) {
        self.inner()
            .in_place_resize_enabled
            .set(if enabled { 1 } else { 0 });
    }
}

/// Structured logger for rightsizing events
///
/// One JSON event per action so runs can be audited and failed patches
/// retried by hand.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_name: String,
}

impl StructuredLogger {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    pub fn log_run_started(&self, dry_run: bool, max_concurrent_deployments: usize) {
        info!(
            event = "rightsizing_run_started",
            cluster = %self.cluster_name,
            dry_run = dry_run,
            max_concurrent_deployments = max_concurrent_deployments,
            "Rightsizing run started"
        );
    }

    pub fn log_run_finished(
        &self,
        namespaces: usize,
        deployments: usize,
        patches_applied: usize,
        patches_failed: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "rightsizing_run_finished",
            cluster = %self.cluster_name,
            namespaces = namespaces,
            deployments = deployments,
            patches_applied = patches_applied,
            patches_failed = patches_failed,
            elapsed_ms = elapsed_ms,
            "Rightsizing run finished"
        );
    }

    /// Log a patch that was sent (or would have been, in dry-run mode)
    pub fn log_patch(&self, kind: &str, namespace: &str, name: &str, body: &str, dry_run: bool) {
        let event = match (kind, dry_run) {
            (_, true) => "patch_planned",
            ("pod", false) => "pod_patched",
            _ => "deployment_patched",
        };
        info!(
            event = event,
            cluster = %self.cluster_name,
            kind = %kind,
            namespace = %namespace,
            name = %name,
            patch = %body,
            dry_run = dry_run,
            "Resource requests patched"
        );
    }

    pub fn log_patch_failed(&self, kind: &str, namespace: &str, name: &str, body: &str, error: &str) {
        warn!(
            event = "patch_failed",
            cluster = %self.cluster_name,
            kind = %kind,
            namespace = %namespace,
            name = %name,
            patch = %body,
            error = %error,
            "Patch rejected; body logged for manual retry"
        );
    }

    pub fn log_container_skipped(
        &self,
        namespace: &str,
        owner: &str,
        container: &str,
        reason: &str,
    ) {
        info!(
            event = "container_skipped",
            cluster = %self.cluster_name,
            namespace = %namespace,
            owner = %owner,
            container = %container,
            reason = %reason,
            "Container left unchanged"
        );
    }

    pub fn log_listing_failed(&self, scope: &str, error: &str) {
        warn!(
            event = "listing_failed",
            cluster = %self.cluster_name,
            scope = %scope,
            error = %error,
            "Listing failed, skipping this branch"
        );
    }

    pub fn log_recommendations_failed(&self, namespace: &str, deployment: &str, error: &str) {
        warn!(
            event = "recommendations_unavailable",
            cluster = %self.cluster_name,
            namespace = %namespace,
            deployment = %deployment,
            error = %error,
            "Could not fetch recommendations, skipping deployment"
        );
    }
}
