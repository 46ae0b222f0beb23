//! Error types for the Graph client

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// API Error Types
// ============================================================================

/// API error response wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

/// API error details
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub code: Option<i64>,
}

// ============================================================================
// Client Error Types
// ============================================================================

/// Errors that can occur when calling the Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// The access token was rejected (expired, revoked, malformed)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Application or user request limit reached
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Platform temporarily unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Invalid request (unknown path, bad parameters)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (bad base URL, missing app id)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl GraphError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GraphError::RateLimited(_) | GraphError::ServiceUnavailable(_) | GraphError::Network(_)
        )
    }

    /// Returns true if an HTTP status code is worth retrying
    pub fn is_retryable_status(status_code: u16) -> bool {
        matches!(status_code, 408 | 429 | 500..=599)
    }

    /// Classify an API error body into an appropriate variant
    ///
    /// Codes 4, 17, 32 and 613 are the platform's throttling codes.
    pub fn from_api_error(error: &ApiError, status_code: u16) -> Self {
        let msg = error.message.clone();

        match (status_code, error.error_type.as_str(), error.code) {
            (_, _, Some(4 | 17 | 32 | 613)) | (429, _, _) => GraphError::RateLimited(msg),
            (401, _, _) | (_, "OAuthException", _) => GraphError::Authentication(msg),
            (500..=599, _, _) => GraphError::ServiceUnavailable(msg),
            (400 | 404, _, _) => GraphError::InvalidRequest(msg),
            _ => GraphError::Other(msg),
        }
    }

    /// Classify a transport error into an appropriate variant
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GraphError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            GraphError::Network(format!("Connection failed: {}", err))
        } else if err.is_request() {
            GraphError::Network(format!("Request failed: {}", err))
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                401 => GraphError::Authentication(err.to_string()),
                429 => GraphError::RateLimited(err.to_string()),
                500..=599 => GraphError::ServiceUnavailable(err.to_string()),
                _ => GraphError::Other(err.to_string()),
            }
        } else {
            GraphError::Other(err.to_string())
        }
    }
}

/// Parse an error body, falling back to the raw text when it is not JSON
pub(crate) fn parse_error_response(body: &str, status_code: u16) -> GraphError {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(parsed) => GraphError::from_api_error(&parsed.error, status_code),
        Err(_) => {
            let msg = if body.is_empty() {
                format!("HTTP {}", status_code)
            } else {
                format!("HTTP {}: {}", status_code, body)
            };
            match status_code {
                401 => GraphError::Authentication(msg),
                429 => GraphError::RateLimited(msg),
                500..=599 => GraphError::ServiceUnavailable(msg),
                400 | 404 => GraphError::InvalidRequest(msg),
                _ => GraphError::Other(msg),
            }
        }
    }
}

/// Configuration for automatic retry behavior
///
/// Exponential backoff: base_delay × 2^attempt with jitter, capped at
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    pub max_retries: u32,

    /// Base delay for exponential backoff (default: 250ms)
    pub base_delay: Duration,

    /// Maximum delay between retries (default: 4s)
    pub max_delay: Duration,

    /// Jitter factor (0.0-1.0) to add randomness to delays (default: 0.25)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            jitter: 0.25,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the specified max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Disable retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay for a given retry attempt (0-indexed)
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base = self.base_delay.as_secs_f64() * 2_f64.powi(attempt as i32);

        let jitter_range = base * self.jitter;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let delay_secs = (base + jitter).max(0.0);

        Duration::from_secs_f64(delay_secs).min(self.max_delay)
    }
}
