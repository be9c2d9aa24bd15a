//! HTTP client for the recommendation API

use super::{async_trait, RecommendationProvider};
use crate::error::ProviderError;
use crate::models::{NamespaceRecommendations, PolicyMap};
use anyhow::Context;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

const POLICIES_PATH: &str = "api/v1/rightsizing/policies";

/// Reads policies and recommendations from the recommendation API
pub struct HttpRecommendationProvider {
    client: Client,
    base_url: Url,
}

impl HttpRecommendationProvider {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Url::join drops the last path segment unless it ends with '/'
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).context("Invalid recommendation API URL")?;

        Ok(Self { client, base_url })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        debug!(url = %url, "Fetching from recommendation API");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RecommendationProvider for HttpRecommendationProvider {
    async fn get_policies(&self) -> Result<PolicyMap, ProviderError> {
        self.get(POLICIES_PATH).await
    }

    async fn get_recommendations(
        &self,
        namespace: &str,
    ) -> Result<NamespaceRecommendations, ProviderError> {
        let path = format!("api/v1/rightsizing/namespaces/{}/recommendations", namespace);
        self.get(&path).await
    }
}
