//! Test utilities for canvasgate-core.
//!
//! Mocks and fixtures for exercising a [`Pipeline`](crate::Pipeline) without
//! talking to the platform.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! canvasgate-core = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::ApplicationConfig;
use crate::context::{
    AccessGrant, Context, HmacSignedRequestVerifier, PageFacts, PermissionGrantSet, User,
};
use crate::error::TransportError;
use crate::events::{GateEvent, GateHook};
use crate::gate::PermissionOracle;

/// Application id used by [`test_config`].
pub const TEST_APP_ID: &str = "123456";
/// Application secret used by [`test_config`].
pub const TEST_APP_SECRET: &str = "test-secret";
/// Canvas URL used by [`test_config`].
pub const TEST_CANVAS_URL: &str = "https://apps.facebook.com/test-app/";

/// A mock permission oracle.
///
/// Returns the grant set registered for a token (an empty set for unknown
/// tokens) and records every token it was asked about.
///
/// # Example
///
/// ```rust,ignore
/// use canvasgate_core::test_utils::MockOracle;
///
/// let oracle = MockOracle::new().with_scopes("user-token", [("read", true)]);
/// ```
#[derive(Clone, Default)]
pub struct MockOracle {
    grants: Arc<Mutex<HashMap<String, PermissionGrantSet>>>,
    failure: Arc<Mutex<Option<TransportError>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the grant set returned for `token`.
    pub fn with_grants(self, token: impl Into<String>, grants: PermissionGrantSet) -> Self {
        self.grants.lock().insert(token.into(), grants);
        self
    }

    /// Register `(scope, granted)` pairs for `token`.
    pub fn with_scopes<S: Into<String>>(
        self,
        token: impl Into<String>,
        scopes: impl IntoIterator<Item = (S, bool)>,
    ) -> Self {
        let grants = scopes
            .into_iter()
            .map(|(scope, granted)| (scope.into(), granted))
            .collect();
        self.with_grants(token, grants)
    }

    /// Fail every call with `error`.
    pub fn failing(self, error: TransportError) -> Self {
        *self.failure.lock() = Some(error);
        self
    }

    /// Number of times the oracle was queried.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Tokens the oracle was queried with, in order.
    pub fn tokens_seen(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PermissionOracle for MockOracle {
    async fn fetch_granted(&self, token: &str) -> Result<PermissionGrantSet, TransportError> {
        self.calls.lock().push(token.to_string());
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        Ok(self.grants.lock().get(token).cloned().unwrap_or_default())
    }
}

/// A hook that records every event it sees.
#[derive(Clone, Default)]
pub struct RecordingHook {
    events: Arc<Mutex<Vec<GateEvent>>>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GateEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl GateHook for RecordingHook {
    fn on_event(&self, event: &GateEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Configuration for the test application.
pub fn test_config() -> ApplicationConfig {
    ApplicationConfig::builder(TEST_APP_ID, TEST_APP_SECRET)
        .canvas_url(TEST_CANVAS_URL)
        .scopes(["email", "publish_stream", "read_stream"])
        .build()
        .expect("test config is valid")
}

/// A user, authorized with `token` when one is given.
pub fn user(token: Option<&str>) -> User {
    User {
        id: token.map(|_| "1001".to_string()),
        locale: Some("en_US".to_string()),
        country: Some("us".to_string()),
        access: token.map(AccessGrant::new),
    }
}

/// Canvas context, with an authorized user when `token` is given.
pub fn canvas_context(token: Option<&str>) -> Context {
    Context::canvas(Some(user(token)))
}

/// Tab context on page `"42"`.
pub fn tab_context(token: Option<&str>, is_admin: bool) -> Context {
    Context::tab(Some(user(token)), PageFacts::new("42").admin(is_admin))
}

/// Envelope for `payload` signed with [`TEST_APP_SECRET`].
pub fn signed_request(payload: &Value) -> String {
    HmacSignedRequestVerifier::new(TEST_APP_SECRET)
        .sign(payload)
        .expect("test secret is usable")
}
