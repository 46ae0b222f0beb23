//! Live permission lookup.

use async_trait::async_trait;

use crate::context::PermissionGrantSet;
use crate::error::TransportError;

/// Answers which scopes an access token currently holds.
///
/// Results are never cached by the pipeline; every permission check asks
/// again, so a scope revoked since the user authorized the app is noticed.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    /// Fetch the live grant state for `token`.
    async fn fetch_granted(&self, token: &str) -> Result<PermissionGrantSet, TransportError>;
}

/// Oracle backed by the platform's Graph API.
#[cfg(feature = "graph")]
#[derive(Debug, Clone)]
pub struct GraphPermissionOracle {
    graph: canvasgate_graph::Graph,
}

#[cfg(feature = "graph")]
impl GraphPermissionOracle {
    pub fn new(graph: canvasgate_graph::Graph) -> Self {
        Self { graph }
    }
}

#[cfg(feature = "graph")]
#[async_trait]
impl PermissionOracle for GraphPermissionOracle {
    async fn fetch_granted(&self, token: &str) -> Result<PermissionGrantSet, TransportError> {
        let granted = self.graph.permissions(token).await?;
        Ok(PermissionGrantSet::from(granted))
    }
}
