//! Integration tests for the rightsizer API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rightsizer::api::{create_router, AppState};
use rightsizer_lib::{health::components, HealthRegistry, RightsizerMetrics};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn setup_test_app(stale_after: Duration) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        HealthRegistry::new(stale_after),
        RightsizerMetrics::new(),
    ));
    (create_router(state.clone()), state)
}

async fn get_status(app: Router, uri: &str) -> StatusCode {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn test_healthz_returns_ok_before_first_run() {
    let (app, _) = setup_test_app(Duration::from_secs(900));
    assert_eq!(get_status(app, "/healthz").await, StatusCode::OK);
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app(Duration::from_secs(900));
    state
        .health_registry
        .set_unhealthy(components::CLUSTER, "api server unreachable")
        .await;

    assert_eq!(
        get_status(app, "/healthz").await,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_runs_never_succeed() {
    let (app, state) = setup_test_app(Duration::from_millis(10));
    state
        .health_registry
        .record_run_failure("namespaces forbidden")
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        get_status(app.clone(), "/healthz").await,
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(get_status(app, "/readyz").await, StatusCode::OK);
}

#[tokio::test]
async fn test_readyz_flips_after_first_run() {
    let (app, state) = setup_test_app(Duration::from_secs(900));
    assert_eq!(
        get_status(app.clone(), "/readyz").await,
        StatusCode::SERVICE_UNAVAILABLE
    );

    state.health_registry.record_run_success().await;
    assert_eq!(get_status(app, "/readyz").await, StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_rightsizer_series() {
    let (app, state) = setup_test_app(Duration::from_secs(900));
    state.metrics.inc_patch("deployment", "applied");

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("rightsizer_patches_total"));
}
