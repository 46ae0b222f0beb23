//! Graph API client

use crate::error::{parse_error_response, GraphError, RetryConfig};
use crate::permissions::{parse_permissions, PermissionMap};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Default Graph API base URL
const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com";

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal profile returned by `/me`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Graph API client
///
/// The client is token-agnostic: every call takes the access token it must
/// be made with, so callers decide whether the application token or a
/// user's token is in effect.
#[derive(Clone)]
pub struct Graph {
    client: reqwest::Client,
    graph_base: Url,
    api_version: Option<String>,
    retry_config: RetryConfig,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("graph_base", &self.graph_base.as_str())
            .field("api_version", &self.api_version)
            .field("retry_config", &self.retry_config)
            .finish()
    }
}

impl Graph {
    /// Create a client with default settings
    pub fn new() -> Result<Self, GraphError> {
        Self::builder().build()
    }

    /// Create a builder for more advanced configuration
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Base URL requests are resolved against
    pub fn graph_base(&self) -> &Url {
        &self.graph_base
    }

    /// Fetch the permission scopes the token's owner has granted
    ///
    /// Scopes the platform does not mention are absent from the map; callers
    /// treat absence as "not granted".
    pub async fn permissions(&self, access_token: &str) -> Result<PermissionMap, GraphError> {
        let body: serde_json::Value = self.get("me/permissions", access_token).await?;
        parse_permissions(&body)
    }

    /// Fetch the profile of the token's owner
    pub async fn me(&self, access_token: &str) -> Result<Profile, GraphError> {
        self.get("me", access_token).await
    }

    /// GET a Graph path with the given access token
    pub async fn get<T>(&self, path: &str, access_token: &str) -> Result<T, GraphError>
    where
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        self.execute_with_retry(url, access_token).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, GraphError> {
        let path = path.trim_start_matches('/');
        let relative = match &self.api_version {
            Some(version) => format!("{}/{}", version, path),
            None => path.to_string(),
        };
        self.graph_base
            .join(&relative)
            .map_err(|e| GraphError::Configuration(format!("Invalid Graph path '{}': {}", path, e)))
    }

    async fn execute_with_retry<T>(&self, url: Url, access_token: &str) -> Result<T, GraphError>
    where
        T: DeserializeOwned,
    {
        let mut last_error: Option<GraphError> = None;

        for attempt in 0..=self.retry_config.max_retries {
            let result = self
                .client
                .get(url.clone())
                .query(&[("access_token", access_token)])
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            GraphError::InvalidResponse(format!("Failed to parse response: {}", e))
                        });
                    }

                    let status_code = status.as_u16();
                    let error_body = response.text().await.unwrap_or_default();
                    let error = parse_error_response(&error_body, status_code);

                    if attempt < self.retry_config.max_retries
                        && GraphError::is_retryable_status(status_code)
                        && error.is_retryable()
                    {
                        tokio::time::sleep(self.retry_config.delay_for_attempt(attempt)).await;
                        last_error = Some(error);
                        continue;
                    }

                    return Err(error);
                }
                Err(e) => {
                    let error = GraphError::from_reqwest_error(e);

                    if attempt < self.retry_config.max_retries && error.is_retryable() {
                        tokio::time::sleep(self.retry_config.delay_for_attempt(attempt)).await;
                        last_error = Some(error);
                        continue;
                    }

                    return Err(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| GraphError::Other("Max retries exceeded".to_string())))
    }
}

/// Builder for Graph client configuration
pub struct GraphBuilder {
    graph_base: Option<String>,
    api_version: Option<String>,
    timeout: Option<Duration>,
    retry_config: Option<RetryConfig>,
}

impl GraphBuilder {
    fn new() -> Self {
        Self {
            graph_base: None,
            api_version: None,
            timeout: None,
            retry_config: None,
        }
    }

    /// Set a custom Graph base URL
    pub fn graph_base(mut self, graph_base: impl Into<String>) -> Self {
        self.graph_base = Some(graph_base.into());
        self
    }

    /// Pin requests to an API version, e.g. `v19.0`
    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the maximum number of retries (default: 2)
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        let mut config = self.retry_config.take().unwrap_or_default();
        config.max_retries = max_retries;
        self.retry_config = Some(config);
        self
    }

    /// Set custom retry configuration
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<Graph, GraphError> {
        let raw_base = self
            .graph_base
            .unwrap_or_else(|| DEFAULT_GRAPH_BASE.to_string());
        // Url::join drops the last path segment unless the base ends with '/'
        let with_slash = if raw_base.ends_with('/') {
            raw_base
        } else {
            format!("{}/", raw_base)
        };
        let graph_base = Url::parse(&with_slash).map_err(|e| {
            GraphError::Configuration(format!("Invalid Graph base URL '{}': {}", with_slash, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| {
                GraphError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Graph {
            client,
            graph_base,
            api_version: self.api_version,
            retry_config: self.retry_config.unwrap_or_default(),
        })
    }
}
