//! Router builder for gated canvas endpoints.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Router,
};
use canvasgate_core::{Pipeline, Requirements};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::error::{BuildError, ServerError};
use crate::middleware::gate_middleware;
use crate::response::LoginRedirect;
use crate::state::{GateState, Settings};

/// Builder for routes protected by a [`Pipeline`].
///
/// # Example
///
/// ```rust,no_run
/// use axum::routing::{get, post};
/// use canvasgate_core::{ContextType, Pipeline, Requirements};
/// use canvasgate_server::{GateContext, GateRouter};
///
/// async fn tab() -> &'static str {
///     "hello, page admin"
/// }
///
/// async fn publish(GateContext(authorized): GateContext) -> String {
///     format!("posting with {:?}", authorized.credentials())
/// }
///
/// # async fn example(pipeline: Pipeline) -> Result<(), Box<dyn std::error::Error>> {
/// let app = GateRouter::new(pipeline)
///     .route(
///         "/tab",
///         post(tab),
///         Requirements::none().contexts([ContextType::Tab]).page_admin(),
///     )
///     .route(
///         "/publish",
///         post(publish),
///         Requirements::none().authorization().permissions(["publish_stream"]),
///     )
///     .with_login("/login")
///     .redirect_unauthorized(true)
///     .build()?;
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub struct GateRouter {
    pipeline: Arc<Pipeline>,
    routes: Vec<(String, MethodRouter, Option<Requirements>)>,
    login_path: Option<String>,
    settings: Settings,
}

impl GateRouter {
    /// Create a new router builder around a pipeline.
    pub fn new(pipeline: Pipeline) -> Self {
        Self::from_arc(Arc::new(pipeline))
    }

    /// Create a new router builder from an existing `Arc<Pipeline>`.
    pub fn from_arc(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            routes: Vec::new(),
            login_path: None,
            settings: Settings::default(),
        }
    }

    /// Add a route gated by the given requirements.
    pub fn route(
        mut self,
        path: impl Into<String>,
        method_router: MethodRouter,
        requirements: Requirements,
    ) -> Self {
        self.routes
            .push((path.into(), method_router, Some(requirements)));
        self
    }

    /// Add a route gated by whatever the pipeline's requirement source
    /// declares for `path` (for example routes loaded from a config file).
    pub fn gated_route(mut self, path: impl Into<String>, method_router: MethodRouter) -> Self {
        self.routes.push((path.into(), method_router, None));
        self
    }

    /// Serve a `GET` endpoint that redirects to the login dialog.
    ///
    /// An optional `redirect` query parameter overrides the return target.
    pub fn with_login(mut self, path: impl Into<String>) -> Self {
        self.login_path = Some(path.into());
        self
    }

    /// Answer authorization and permission failures with a login redirect
    /// instead of a JSON error.
    pub fn redirect_unauthorized(mut self, enabled: bool) -> Self {
        self.settings.redirect_unauthorized = enabled;
        self
    }

    /// Name of the cookie holding the session id.
    pub fn session_cookie(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie = name.into();
        self
    }

    /// Largest form body buffered while looking for `signed_request`.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.settings.max_body_bytes = limit;
        self
    }

    /// Build the router with all configured routes.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoRoutes`] if no gated route was added.
    pub fn build(self) -> Result<Router, BuildError> {
        if self.routes.is_empty() {
            return Err(BuildError::NoRoutes);
        }

        let state = GateState::new(self.pipeline.clone(), Arc::new(self.settings));
        let mut router = Router::new();

        for (path, method_router, requirements) in self.routes {
            // Resolved here so nesting under a prefix does not change the lookup key.
            let requirements =
                requirements.unwrap_or_else(|| self.pipeline.requirements_for(&path));
            let layer = middleware::from_fn_with_state(
                state.with_requirements(requirements),
                gate_middleware,
            );
            router = router.route(&path, method_router.layer(layer));
        }

        if let Some(login_path) = self.login_path {
            router = router.route(&login_path, get(login_handler).with_state(state));
        }

        Ok(router.layer(TraceLayer::new_for_http()))
    }

    /// Build the router and nest it under a prefix path.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoRoutes`] if no gated route was added.
    pub fn build_nested(self, prefix: impl Into<String>) -> Result<Router, BuildError> {
        Ok(Router::new().nest(&prefix.into(), self.build()?))
    }
}

#[derive(Debug, Deserialize)]
struct LoginParams {
    redirect: Option<String>,
}

async fn login_handler(
    State(state): State<GateState>,
    Query(params): Query<LoginParams>,
) -> Response {
    if let Some(target) = params.redirect.as_deref() {
        if let Err(e) = check_redirect_target(target) {
            return e.into_response();
        }
    }
    match state.pipeline.authorize_redirect(params.redirect.as_deref()) {
        Ok(redirect) => LoginRedirect(redirect).into_response(),
        Err(e) => ServerError::from(e).into_response(),
    }
}

/// The return target comes from the client, so a bad one is the request's
/// fault rather than the route's.
fn check_redirect_target(target: &str) -> Result<(), ServerError> {
    let url = Url::parse(target).map_err(|e| {
        ServerError::InvalidRequest(format!(
            "redirect target '{}' is not an absolute URL: {}",
            target, e
        ))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ServerError::InvalidRequest(format!(
            "redirect target scheme '{}' is not allowed",
            scheme
        ))),
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
