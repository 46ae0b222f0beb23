//! Shared state for the gate middleware.

use std::sync::Arc;

use canvasgate_core::{Pipeline, Requirements};

/// Default name of the session id cookie.
pub const DEFAULT_SESSION_COOKIE: &str = "canvasgate_sid";

/// Default cap on buffered form bodies.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Settings shared by every gated route.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub session_cookie: String,
    pub redirect_unauthorized: bool,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            redirect_unauthorized: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// State cloned into each gated route's middleware.
#[derive(Clone)]
pub(crate) struct GateState {
    pub pipeline: Arc<Pipeline>,
    pub settings: Arc<Settings>,
    /// Requirements of the route this state is attached to.
    pub requirements: Requirements,
}

impl GateState {
    pub fn new(pipeline: Arc<Pipeline>, settings: Arc<Settings>) -> Self {
        Self {
            pipeline,
            settings,
            requirements: Requirements::none(),
        }
    }

    pub fn with_requirements(&self, requirements: Requirements) -> Self {
        Self {
            requirements,
            ..self.clone()
        }
    }
}
