//! Workload rightsizing library
//!
//! This crate provides the core functionality for:
//! - Resource quantity parsing and formatting
//! - LimitRange bound resolution
//! - Per-container patch decisions against recommendations
//! - Feature-gate detection for in-place pod resize
//! - Walking the cluster and dispatching patches with bounded concurrency
//! - Health checks and observability

pub mod bounds;
pub mod cache;
pub mod cluster;
pub mod decision;
pub mod error;
pub mod feature_gates;
pub mod health;
pub mod models;
pub mod observability;
pub mod quantity;
pub mod recommendations;
pub mod walker;

pub use bounds::{BoundsMergeStrategy, BoundsResolver, ContainerBoundRange, ResourceBound};
pub use cluster::{ClusterClient, InMemoryClusterClient, KubeClusterClient};
pub use error::{ClusterError, ProviderError, QuantityError, RightsizingError};
pub use feature_gates::{FeatureGateDetector, InPlaceResizeMode};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{RightsizerMetrics, StructuredLogger};
pub use recommendations::{
    CachedRecommendationProvider, HttpRecommendationProvider, RecommendationProvider,
    StaticRecommendationProvider,
};
pub use walker::{ClusterWalker, PatchKind, PatchOutcome, PatchRecord, RunSummary, WalkerConfig};
