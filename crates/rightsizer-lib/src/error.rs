//! Error taxonomy for the rightsizing loop
//!
//! Cluster calls fail with [`ClusterError`], which mirrors the API server's
//! own classification. The walker wraps those into [`RightsizingError`] so a
//! log line always says whether a listing or a patch went wrong.

use thiserror::Error;

/// An unparseable or unsupported resource quantity
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("malformed quantity {value:?}: {reason}")]
    Malformed { value: String, reason: String },
}

impl QuantityError {
    pub(crate) fn malformed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by a [`crate::cluster::ClusterClient`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("api error ({code}): {message}")]
    Api { code: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => match resp.code {
                404 => ClusterError::NotFound(resp.message),
                403 => ClusterError::Forbidden(resp.message),
                409 => ClusterError::Conflict(resp.message),
                408 | 504 => ClusterError::Timeout(resp.message),
                code => ClusterError::Api {
                    code,
                    message: resp.message,
                },
            },
            other => ClusterError::Transport(other.to_string()),
        }
    }
}

/// Failures fetching policies or recommendations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("recommendation request failed: {0}")]
    Request(String),
    #[error("recommendation api returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode recommendation payload: {0}")]
    Decode(String),
}

/// Errors surfaced by the cluster walker
#[derive(Debug, Clone, Error)]
pub enum RightsizingError {
    /// Enumerating namespaces, deployments, pods or bounds failed
    #[error("failed to list {resource} in {namespace:?}: {source}")]
    Listing {
        resource: &'static str,
        namespace: Option<String>,
        #[source]
        source: ClusterError,
    },

    /// The cluster rejected a specific patch
    #[error("failed to patch {kind} {namespace}/{name}: {source}")]
    Patch {
        kind: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: ClusterError,
    },

    #[error(transparent)]
    MalformedQuantity(#[from] QuantityError),

    /// Feature-gate detection failed
    #[error("feature gate scrape failed: {0}")]
    Scrape(#[source] ClusterError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl RightsizingError {
    pub(crate) fn listing(
        resource: &'static str,
        namespace: Option<&str>,
        source: ClusterError,
    ) -> Self {
        Self::Listing {
            resource,
            namespace: namespace.map(str::to_string),
            source,
        }
    }
}
