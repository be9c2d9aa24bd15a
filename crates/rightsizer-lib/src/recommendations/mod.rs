//! Sources of rightsizing policy and recommended requests
//!
//! - [`StaticRecommendationProvider`]: fixed maps, for tests and demos
//! - [`HttpRecommendationProvider`]: the recommendation API over HTTP
//! - [`CachedRecommendationProvider`]: TTL cache in front of either

mod cached;
mod http;
mod r#static;

pub use cached::CachedRecommendationProvider;
pub use http::HttpRecommendationProvider;
pub use r#static::StaticRecommendationProvider;

use crate::error::ProviderError;
use crate::models::{NamespaceRecommendations, PolicyMap};

pub use async_trait::async_trait;

/// Where policies and recommendations come from
#[async_trait]
pub trait RecommendationProvider: Send + Sync {
    /// namespace -> deployment -> policy, for every configured deployment
    async fn get_policies(&self) -> Result<PolicyMap, ProviderError>;

    /// deployment -> container -> recommended requests, for one namespace
    async fn get_recommendations(
        &self,
        namespace: &str,
    ) -> Result<NamespaceRecommendations, ProviderError>;
}
