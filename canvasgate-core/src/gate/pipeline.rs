//! The authorization pipeline.
//!
//! A request is handled in two phases. Context resolution first verifies a
//! fresh signed envelope, if the request carries one, and stores the
//! resulting [`Context`]. Then the four gates in [`Gate::ORDER`] run against
//! the route's [`Requirements`], stopping at the first failure.

use std::sync::Arc;

use url::Url;

use super::credentials::RequestCredentials;
use super::oracle::PermissionOracle;
use super::requirements::{RequirementSource, Requirements, StaticRequirements};
use crate::config::{ApplicationConfig, VerificationFailurePolicy};
use crate::context::{
    Context, ContextStore, MemoryContextStore, SessionId, SignedRequestVerifier,
};
use crate::error::{AuthorizationError, ContextError, GateError};
use crate::events::{GateEvent, GateHook};
use crate::login::{LoginUrl, Redirect};

/// One stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    /// The stored context has an accepted type.
    Context,
    /// The user authorized the application.
    Authentication,
    /// The user's token holds every required scope.
    Permission,
    /// The viewer administers the page hosting the tab.
    PageAdmin,
}

impl Gate {
    /// Evaluation order. Each gate relies on the ones before it having
    /// passed or been skipped.
    pub const ORDER: [Gate; 4] = [
        Gate::Context,
        Gate::Authentication,
        Gate::Permission,
        Gate::PageAdmin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Context => "context",
            Gate::Authentication => "authentication",
            Gate::Permission => "permission",
            Gate::PageAdmin => "page_admin",
        }
    }
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a gate that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The route does not declare this gate's requirement.
    Skipped,
    /// The requirement is declared and met.
    Passed,
}

/// What the pipeline needs to know about an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRequest {
    pub session: SessionId,
    /// Route the request matched, used to look up requirements.
    pub route: String,
    /// Raw signed envelope, when the request carries one.
    pub signed_request: Option<String>,
}

impl GateRequest {
    pub fn new(session: SessionId, route: impl Into<String>) -> Self {
        Self {
            session,
            route: route.into(),
            signed_request: None,
        }
    }

    pub fn with_signed_request(mut self, raw: impl Into<String>) -> Self {
        self.signed_request = Some(raw.into());
        self
    }
}

/// A request that passed every declared gate.
#[derive(Debug, Clone)]
pub struct Authorized {
    context: Option<Context>,
    requirements: Requirements,
    credentials: RequestCredentials,
}

impl Authorized {
    /// Context in effect for the request, if any was ever resolved.
    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Credentials downstream calls to the platform must use.
    pub fn credentials(&self) -> &RequestCredentials {
        &self.credentials
    }

    pub fn access_token(&self) -> &str {
        self.credentials.access_token()
    }
}

/// Authorization pipeline for one application.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use canvasgate_core::{
///     ApplicationConfig, GateRequest, PermissionGrantSet, PermissionOracle, Pipeline,
///     Requirements, SessionId, StaticRequirements, TransportError,
/// };
///
/// struct NoScopes;
///
/// #[async_trait]
/// impl PermissionOracle for NoScopes {
///     async fn fetch_granted(&self, _token: &str) -> Result<PermissionGrantSet, TransportError> {
///         Ok(PermissionGrantSet::new())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let config = ApplicationConfig::builder("123", "secret")
///     .canvas_url("https://apps.facebook.com/myapp/")
///     .build()
///     .unwrap();
///
/// let pipeline = Pipeline::builder(config)
///     .oracle(NoScopes)
///     .requirements(StaticRequirements::new().route("/", Requirements::none()))
///     .build()
///     .unwrap();
///
/// let authorized = pipeline
///     .authorize(GateRequest::new(SessionId::new("s"), "/"))
///     .await
///     .unwrap();
/// assert!(authorized.context().is_none());
/// assert_eq!(authorized.access_token(), "123|secret");
/// # });
/// ```
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<ApplicationConfig>,
    store: Arc<dyn ContextStore>,
    verifier: Arc<dyn SignedRequestVerifier>,
    oracle: Arc<dyn PermissionOracle>,
    requirements: Arc<dyn RequirementSource>,
    hooks: Vec<Arc<dyn GateHook>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn builder(config: ApplicationConfig) -> PipelineBuilder {
        PipelineBuilder::new(config)
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ContextStore> {
        &self.store
    }

    /// Requirements declared for `route`; an undeclared route requires nothing.
    pub fn requirements_for(&self, route: &str) -> Requirements {
        self.requirements.requirements(route).unwrap_or_default()
    }

    /// Run context resolution and every gate for a request, using the
    /// requirements declared for its route.
    pub async fn authorize(&self, request: GateRequest) -> Result<Authorized, GateError> {
        let requirements = self.requirements_for(&request.route);
        self.authorize_with(request, requirements).await
    }

    /// Like [`authorize`](Self::authorize), with requirements supplied by the
    /// caller instead of looked up by route.
    pub async fn authorize_with(
        &self,
        request: GateRequest,
        requirements: Requirements,
    ) -> Result<Authorized, GateError> {
        let context = self
            .resolve_context(&request.session, request.signed_request.as_deref())
            .await?;
        let mut credentials = RequestCredentials::application(self.config.app_access_token());

        for gate in Gate::ORDER {
            match gate {
                Gate::Context => self.check_context(&requirements, context.as_ref())?,
                Gate::Authentication => {
                    self.check_authentication(&requirements, context.as_ref(), &mut credentials)?
                }
                Gate::Permission => {
                    self.check_permissions(&requirements, context.as_ref()).await?
                }
                Gate::PageAdmin => self.check_page_admin(&requirements, context.as_ref())?,
            };
        }

        Ok(Authorized {
            context,
            requirements,
            credentials,
        })
    }

    /// Establish the context for this request.
    ///
    /// With an envelope, the envelope is verified and the resulting context
    /// replaces whatever the session held. Without one, the stored context
    /// (or none) stays authoritative. A failed verification is handled per
    /// the configured [`VerificationFailurePolicy`].
    pub async fn resolve_context(
        &self,
        session: &SessionId,
        signed_request: Option<&str>,
    ) -> Result<Option<Context>, GateError> {
        let app_id = self.config.id();

        let Some(raw) = signed_request else {
            return Ok(self.store.load(session, app_id).await?);
        };

        let verified = self
            .verifier
            .verify(raw)
            .and_then(|claims| Context::from_claims(&claims));

        let error = match verified {
            Ok(context) => {
                self.store.save(session, app_id, context.clone()).await?;
                self.emit(GateEvent::ContextResolved {
                    app_id: app_id.to_string(),
                    context_type: context.context_type().clone(),
                });
                return Ok(Some(context));
            }
            Err(error) => error,
        };

        self.emit(GateEvent::ContextVerificationFailed {
            app_id: app_id.to_string(),
            error: error.to_string(),
        });

        match self.config.verification_failure() {
            VerificationFailurePolicy::Reject => Err(error.into()),
            VerificationFailurePolicy::Invalidate => {
                if self.store.remove(session, app_id).await? {
                    self.emit(GateEvent::ContextInvalidated {
                        app_id: app_id.to_string(),
                    });
                }
                Err(error.into())
            }
            VerificationFailurePolicy::KeepStale => {
                let prior = self.store.load(session, app_id).await?;
                self.emit(GateEvent::ContextRetained {
                    app_id: app_id.to_string(),
                    context_type: prior.as_ref().map(|c| c.context_type().clone()),
                });
                Ok(prior)
            }
        }
    }

    /// Context-type gate.
    pub fn check_context(
        &self,
        requirements: &Requirements,
        context: Option<&Context>,
    ) -> Result<GateOutcome, GateError> {
        self.record(Gate::Context, evaluate_context(requirements, context))
    }

    /// Authentication gate.
    ///
    /// On success `credentials` is switched to the user's grant token; every
    /// later outbound call for the request must go through it.
    pub fn check_authentication(
        &self,
        requirements: &Requirements,
        context: Option<&Context>,
        credentials: &mut RequestCredentials,
    ) -> Result<GateOutcome, GateError> {
        let result = self.evaluate_authentication(requirements, context, credentials);
        self.record(Gate::Authentication, result)
    }

    fn evaluate_authentication(
        &self,
        requirements: &Requirements,
        context: Option<&Context>,
        credentials: &mut RequestCredentials,
    ) -> Result<Option<String>, GateError> {
        if !requirements.authorization {
            return Ok(None);
        }
        let token = context
            .and_then(Context::user_token)
            .ok_or(AuthorizationError::NotAuthorized)?;

        credentials.switch_to_user(token);
        self.emit(GateEvent::TokenSwitched {
            user_id: context.and_then(Context::user).and_then(|u| u.id.clone()),
        });
        Ok(Some("application authorized by user".to_string()))
    }

    /// Permission gate.
    ///
    /// Always asks the oracle with the user's own grant token, whether or not
    /// the authentication gate ran.
    pub async fn check_permissions(
        &self,
        requirements: &Requirements,
        context: Option<&Context>,
    ) -> Result<GateOutcome, GateError> {
        let result = self.evaluate_permissions(requirements, context).await;
        self.record(Gate::Permission, result)
    }

    async fn evaluate_permissions(
        &self,
        requirements: &Requirements,
        context: Option<&Context>,
    ) -> Result<Option<String>, GateError> {
        let Some(required) = &requirements.permissions else {
            return Ok(None);
        };
        let token = context
            .and_then(Context::user_token)
            .ok_or(AuthorizationError::NoAccessGrant)?;

        let granted = self.oracle.fetch_granted(token).await?;
        let missing = granted.missing(required);
        if !missing.is_empty() {
            return Err(GateError::Permission { missing });
        }
        Ok(Some(format!("granted [ {} ]", required.join(", "))))
    }

    /// Page-admin gate.
    ///
    /// Declaring this requirement on a route reached outside a tab is a
    /// configuration error, not a role rejection.
    pub fn check_page_admin(
        &self,
        requirements: &Requirements,
        context: Option<&Context>,
    ) -> Result<GateOutcome, GateError> {
        self.record(Gate::PageAdmin, evaluate_page_admin(requirements, context))
    }

    /// Login dialog URL asking for the application's full scope list.
    ///
    /// `redirect` overrides the canvas URL as the return target and must be
    /// absolute.
    pub fn authorization_url(&self, redirect: Option<&str>) -> Result<Url, GateError> {
        let mut login = LoginUrl::for_application(&self.config);
        if let Some(target) = redirect {
            let target = Url::parse(target).map_err(|e| {
                GateError::Configuration(format!(
                    "redirect target '{}' is not an absolute URL: {}",
                    target, e
                ))
            })?;
            login = login.redirect_uri(target);
        }
        Ok(login.build())
    }

    /// [`authorization_url`](Self::authorization_url) wrapped in a redirect
    /// instruction using the configured delivery mode.
    pub fn authorize_redirect(&self, redirect: Option<&str>) -> Result<Redirect, GateError> {
        let url = self.authorization_url(redirect)?;
        Ok(Redirect::new(url, self.config.redirect_mode()))
    }

    fn record(
        &self,
        gate: Gate,
        result: Result<Option<String>, GateError>,
    ) -> Result<GateOutcome, GateError> {
        match result {
            Ok(None) => {
                self.emit(GateEvent::GateSkipped { gate });
                Ok(GateOutcome::Skipped)
            }
            Ok(Some(detail)) => {
                self.emit(GateEvent::GatePassed { gate, detail });
                Ok(GateOutcome::Passed)
            }
            Err(error) => {
                self.emit(GateEvent::GateFailed {
                    gate,
                    kind: error.kind(),
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    fn emit(&self, event: GateEvent) {
        for hook in &self.hooks {
            hook.on_event(&event);
        }
    }
}

fn evaluate_context(
    requirements: &Requirements,
    context: Option<&Context>,
) -> Result<Option<String>, GateError> {
    let Some(allowed) = &requirements.contexts else {
        return Ok(None);
    };
    let context = context.ok_or(ContextError::Missing)?;
    if !allowed.contains(context.context_type()) {
        return Err(ContextError::NotAllowed {
            actual: context.context_type().clone(),
            allowed: allowed.clone(),
        }
        .into());
    }
    Ok(Some(format!("{} context accepted", context.context_type())))
}

fn evaluate_page_admin(
    requirements: &Requirements,
    context: Option<&Context>,
) -> Result<Option<String>, GateError> {
    if !requirements.page_admin {
        return Ok(None);
    }
    let context = context.ok_or(ContextError::Missing)?;
    if !context.is_tab() {
        return Err(GateError::Configuration(format!(
            "page_admin is only meaningful in a tab context, got \"{}\"",
            context.context_type()
        )));
    }
    match context.page() {
        Some(page) if page.is_admin => Ok(Some(format!("admin of page {}", page.id))),
        _ => Err(GateError::Role),
    }
}

/// Builder for [`Pipeline`].
///
/// Only the application config is required. The store defaults to
/// [`MemoryContextStore`], the verifier to the config's HMAC verifier and the
/// requirement table to an empty [`StaticRequirements`]. Without the `graph`
/// feature an oracle must be supplied.
pub struct PipelineBuilder {
    config: ApplicationConfig,
    store: Option<Arc<dyn ContextStore>>,
    verifier: Option<Arc<dyn SignedRequestVerifier>>,
    oracle: Option<Arc<dyn PermissionOracle>>,
    requirements: Option<Arc<dyn RequirementSource>>,
    hooks: Vec<Arc<dyn GateHook>>,
}

impl PipelineBuilder {
    pub fn new(config: ApplicationConfig) -> Self {
        Self {
            config,
            store: None,
            verifier: None,
            oracle: None,
            requirements: None,
            hooks: Vec::new(),
        }
    }

    pub fn store(self, store: impl ContextStore + 'static) -> Self {
        self.shared_store(Arc::new(store))
    }

    /// Use a store shared with other pipelines or with the caller.
    pub fn shared_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn verifier(mut self, verifier: impl SignedRequestVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    pub fn oracle(mut self, oracle: impl PermissionOracle + 'static) -> Self {
        self.oracle = Some(Arc::new(oracle));
        self
    }

    pub fn requirements(mut self, requirements: impl RequirementSource + 'static) -> Self {
        self.requirements = Some(Arc::new(requirements));
        self
    }

    /// Add an observer. Hooks are called in registration order.
    pub fn hook(mut self, hook: impl GateHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Pipeline, GateError> {
        let oracle = match self.oracle {
            Some(oracle) => oracle,
            None => default_oracle(&self.config)?,
        };
        let verifier = match self.verifier {
            Some(verifier) => verifier,
            None => Arc::new(self.config.verifier()),
        };

        Ok(Pipeline {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryContextStore::new())),
            verifier,
            oracle,
            requirements: self
                .requirements
                .unwrap_or_else(|| Arc::new(StaticRequirements::new())),
            hooks: self.hooks,
            config: Arc::new(self.config),
        })
    }
}

#[cfg(feature = "graph")]
fn default_oracle(config: &ApplicationConfig) -> Result<Arc<dyn PermissionOracle>, GateError> {
    let graph = config
        .graph()
        .map_err(|e| GateError::Configuration(format!("Graph client: {}", e)))?;
    Ok(Arc::new(super::oracle::GraphPermissionOracle::new(graph)))
}

#[cfg(not(feature = "graph"))]
fn default_oracle(_config: &ApplicationConfig) -> Result<Arc<dyn PermissionOracle>, GateError> {
    Err(GateError::Configuration(
        "no permission oracle configured".into(),
    ))
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
