//! TTL-caching decorator for any [`RecommendationProvider`]

use super::{async_trait, RecommendationProvider};
use crate::cache::TtlCache;
use crate::error::ProviderError;
use crate::models::{NamespaceRecommendations, PolicyMap};
use std::sync::Arc;
use std::time::Duration;

/// Caches policies (one entry) and recommendations (one entry per namespace)
pub struct CachedRecommendationProvider {
    inner: Arc<dyn RecommendationProvider>,
    policies: TtlCache<(), PolicyMap>,
    recommendations: TtlCache<String, NamespaceRecommendations>,
}

impl CachedRecommendationProvider {
    pub fn new(inner: Arc<dyn RecommendationProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            policies: TtlCache::new(ttl),
            recommendations: TtlCache::new(ttl),
        }
    }
}

#[async_trait]
impl RecommendationProvider for CachedRecommendationProvider {
    async fn get_policies(&self) -> Result<PolicyMap, ProviderError> {
        self.policies
            .get_or_try_insert_with((), || self.inner.get_policies())
            .await
    }

    async fn get_recommendations(
        &self,
        namespace: &str,
    ) -> Result<NamespaceRecommendations, ProviderError> {
        self.recommendations
            .get_or_try_insert_with(namespace.to_string(), || {
                self.inner.get_recommendations(namespace)
            })
            .await
    }
}
