//! Application configuration.
//!
//! An [`ApplicationConfig`] can be assembled with its builder, read from
//! `CANVASGATE_*` environment variables, or loaded together with per-route
//! requirements from a JSON file (see [`load_config_file`]).

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::context::HmacSignedRequestVerifier;
use crate::gate::StaticRequirements;
use crate::login::{RedirectMode, DEFAULT_DIALOG_URL};

/// Environment variable holding the application id.
pub const ENV_APP_ID: &str = "CANVASGATE_APP_ID";
/// Environment variable holding the application secret.
pub const ENV_APP_SECRET: &str = "CANVASGATE_APP_SECRET";
/// Environment variable holding the canonical canvas URL.
pub const ENV_CANVAS_URL: &str = "CANVASGATE_CANVAS_URL";
/// Environment variable holding the comma-separated scope list.
pub const ENV_SCOPES: &str = "CANVASGATE_SCOPES";
/// Environment variable holding an explicit application access token.
pub const ENV_APP_TOKEN: &str = "CANVASGATE_APP_TOKEN";

/// Errors raised while building or loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid URL for {field}: {message}")]
    InvalidUrl { field: &'static str, message: String },

    #[error("Missing environment variable {0}")]
    MissingEnv(&'static str),
}

/// What to do when a fresh signed envelope fails verification.
///
/// The previously stored context (if any) was verified earlier in the
/// session; this decides whether a bad envelope revokes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFailurePolicy {
    /// Fail the request and leave the stored context untouched.
    #[default]
    Reject,
    /// Remove the stored context, then fail the request.
    Invalidate,
    /// Warn through the hooks and keep serving the stored context.
    KeepStale,
}

/// Settings of one embedded application.
#[derive(Clone)]
pub struct ApplicationConfig {
    id: String,
    secret: String,
    canvas_url: Url,
    scopes: Vec<String>,
    app_access_token: Option<String>,
    dialog_url: Url,
    graph_base: Option<Url>,
    api_version: Option<String>,
    redirect_mode: RedirectMode,
    verification_failure: VerificationFailurePolicy,
    max_age: Option<Duration>,
}

impl std::fmt::Debug for ApplicationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationConfig")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .field("canvas_url", &self.canvas_url.as_str())
            .field("scopes", &self.scopes)
            .field(
                "app_access_token",
                &self.app_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("dialog_url", &self.dialog_url.as_str())
            .field("graph_base", &self.graph_base.as_ref().map(Url::as_str))
            .field("api_version", &self.api_version)
            .field("redirect_mode", &self.redirect_mode)
            .field("verification_failure", &self.verification_failure)
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl ApplicationConfig {
    /// Start building a configuration for application `id`.
    pub fn builder(id: impl Into<String>, secret: impl Into<String>) -> ApplicationConfigBuilder {
        ApplicationConfigBuilder::new(id, secret)
    }

    /// Read configuration from `CANVASGATE_*` environment variables.
    ///
    /// `CANVASGATE_APP_ID`, `CANVASGATE_APP_SECRET` and
    /// `CANVASGATE_CANVAS_URL` are required. `CANVASGATE_SCOPES` is a
    /// comma-separated list; `CANVASGATE_APP_TOKEN` overrides the derived
    /// application token.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };

        let mut builder = Self::builder(required(ENV_APP_ID)?, required(ENV_APP_SECRET)?)
            .canvas_url(required(ENV_CANVAS_URL)?);

        if let Some(scopes) = lookup(ENV_SCOPES) {
            builder = builder.scopes(scopes.split(','));
        }
        if let Some(token) = lookup(ENV_APP_TOKEN).filter(|t| !t.is_empty()) {
            builder = builder.app_access_token(token);
        }

        builder.build()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Canonical URL of the application inside the platform.
    pub fn canvas_url(&self) -> &Url {
        &self.canvas_url
    }

    /// Every scope the application asks users for.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Token used for outbound calls until a user token takes over.
    ///
    /// Defaults to the platform's `"{id}|{secret}"` application token form.
    pub fn app_access_token(&self) -> String {
        match &self.app_access_token {
            Some(token) => token.clone(),
            None => format!("{}|{}", self.id, self.secret),
        }
    }

    pub fn dialog_url(&self) -> &Url {
        &self.dialog_url
    }

    pub fn graph_base(&self) -> Option<&Url> {
        self.graph_base.as_ref()
    }

    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    pub fn redirect_mode(&self) -> RedirectMode {
        self.redirect_mode
    }

    pub fn verification_failure(&self) -> VerificationFailurePolicy {
        self.verification_failure
    }

    /// Maximum accepted age of a signed envelope.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Verifier keyed by this application's secret.
    pub fn verifier(&self) -> HmacSignedRequestVerifier {
        let verifier = HmacSignedRequestVerifier::new(self.secret.clone());
        match self.max_age {
            Some(max_age) => verifier.with_max_age(max_age),
            None => verifier,
        }
    }

    /// Graph client pointed at this application's Graph endpoint.
    #[cfg(feature = "graph")]
    pub fn graph(&self) -> Result<canvasgate_graph::Graph, canvasgate_graph::GraphError> {
        let mut builder = canvasgate_graph::Graph::builder();
        if let Some(base) = &self.graph_base {
            builder = builder.graph_base(base.as_str());
        }
        if let Some(version) = &self.api_version {
            builder = builder.api_version(version.clone());
        }
        builder.build()
    }
}

/// Builder for [`ApplicationConfig`]. URLs are validated in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ApplicationConfigBuilder {
    id: String,
    secret: String,
    canvas_url: Option<String>,
    scopes: Vec<String>,
    app_access_token: Option<String>,
    dialog_url: Option<String>,
    graph_base: Option<String>,
    api_version: Option<String>,
    redirect_mode: RedirectMode,
    verification_failure: VerificationFailurePolicy,
    max_age: Option<Duration>,
}

impl ApplicationConfigBuilder {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            canvas_url: None,
            scopes: Vec::new(),
            app_access_token: None,
            dialog_url: None,
            graph_base: None,
            api_version: None,
            redirect_mode: RedirectMode::default(),
            verification_failure: VerificationFailurePolicy::default(),
            max_age: None,
        }
    }

    /// Canonical canvas URL (required, absolute).
    pub fn canvas_url(mut self, url: impl Into<String>) -> Self {
        self.canvas_url = Some(url.into());
        self
    }

    /// Full scope list. Blank entries and repeats are dropped.
    pub fn scopes<S: AsRef<str>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.scopes.clear();
        for scope in scopes {
            let scope = scope.as_ref().trim();
            if !scope.is_empty() && !self.scopes.iter().any(|s| s == scope) {
                self.scopes.push(scope.to_string());
            }
        }
        self
    }

    pub fn app_access_token(mut self, token: impl Into<String>) -> Self {
        self.app_access_token = Some(token.into());
        self
    }

    /// Login dialog endpoint. Defaults to the platform's OAuth dialog.
    pub fn dialog_url(mut self, url: impl Into<String>) -> Self {
        self.dialog_url = Some(url.into());
        self
    }

    pub fn graph_base(mut self, url: impl Into<String>) -> Self {
        self.graph_base = Some(url.into());
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn redirect_mode(mut self, mode: RedirectMode) -> Self {
        self.redirect_mode = mode;
        self
    }

    pub fn verification_failure(mut self, policy: VerificationFailurePolicy) -> Self {
        self.verification_failure = policy;
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn build(self) -> Result<ApplicationConfig, ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Invalid("application id is empty".into()));
        }
        if self.secret.is_empty() {
            return Err(ConfigError::Invalid("application secret is empty".into()));
        }

        let canvas_url = self
            .canvas_url
            .ok_or_else(|| ConfigError::Invalid("canvas_url is required".into()))?;
        let canvas_url = parse_url("canvas_url", &canvas_url)?;
        let dialog_url = parse_url(
            "dialog_url",
            self.dialog_url.as_deref().unwrap_or(DEFAULT_DIALOG_URL),
        )?;
        let graph_base = self
            .graph_base
            .as_deref()
            .map(|url| parse_url("graph_base", url))
            .transpose()?;

        Ok(ApplicationConfig {
            id: self.id,
            secret: self.secret,
            canvas_url,
            scopes: self.scopes,
            app_access_token: self.app_access_token,
            dialog_url,
            graph_base,
            api_version: self.api_version,
            redirect_mode: self.redirect_mode,
            verification_failure: self.verification_failure,
            max_age: self.max_age,
        })
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        message: format!("'{}': {}", value, e),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            field,
            message: format!("'{}' is not a hierarchical URL", value),
        });
    }
    Ok(url)
}

/// Contents of a configuration file.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub application: ApplicationConfig,
    /// Requirements declared per route path.
    pub routes: StaticRequirements,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    application: ApplicationEntry,
    #[serde(default)]
    routes: StaticRequirements,
}

#[derive(Debug, Deserialize)]
struct ApplicationEntry {
    id: String,
    secret: String,
    canvas_url: String,
    #[serde(default)]
    scopes: Vec<String>,
    app_access_token: Option<String>,
    dialog_url: Option<String>,
    graph_base: Option<String>,
    api_version: Option<String>,
    #[serde(default)]
    redirect_mode: RedirectMode,
    #[serde(default)]
    verification_failure: VerificationFailurePolicy,
    max_age_secs: Option<u64>,
}

impl ApplicationEntry {
    fn into_config(self) -> Result<ApplicationConfig, ConfigError> {
        let mut builder = ApplicationConfig::builder(self.id, self.secret)
            .canvas_url(self.canvas_url)
            .scopes(self.scopes)
            .redirect_mode(self.redirect_mode)
            .verification_failure(self.verification_failure);

        if let Some(token) = self.app_access_token.filter(|t| !t.is_empty()) {
            builder = builder.app_access_token(token);
        }
        if let Some(url) = self.dialog_url {
            builder = builder.dialog_url(url);
        }
        if let Some(url) = self.graph_base {
            builder = builder.graph_base(url);
        }
        if let Some(version) = self.api_version {
            builder = builder.api_version(version);
        }
        if let Some(secs) = self.max_age_secs {
            builder = builder.max_age(Duration::from_secs(secs));
        }

        builder.build()
    }
}

/// Load application settings and route requirements from a JSON file
///
/// Supports environment variable expansion using `${VAR}` or `${VAR:-default}` syntax,
/// so secrets can stay out of the file:
///
/// ```json
/// {
///   "application": {
///     "id": "${CANVASGATE_APP_ID}",
///     "secret": "${CANVASGATE_APP_SECRET}",
///     "canvas_url": "https://apps.facebook.com/myapp/",
///     "scopes": ["email", "publish_stream"]
///   },
///   "routes": {
///     "/tab": { "contexts": ["tab"], "page_admin": true }
///   }
/// }
/// ```
pub async fn load_config_file(path: impl AsRef<Path>) -> Result<GateConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path.as_ref()).await?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<GateConfig, ConfigError> {
    let expanded = expand_env_vars(content);
    let file: ConfigFile = serde_json::from_str(&expanded)?;

    Ok(GateConfig {
        application: file.application.into_config()?,
        routes: file.routes,
    })
}

/// Expand environment variables in a string
///
/// Supports:
/// - `${VAR}` - expands to the value of VAR, or empty string if not set
/// - `${VAR:-default}` - expands to the value of VAR, or "default" if not set
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            // Unterminated reference, keep it verbatim
            result.push_str(&rest[start..]);
            return result;
        };

        let expr = &after[..end];
        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };

        match std::env::var(name) {
            Ok(value) => result.push_str(&value),
            Err(_) => result.push_str(default.unwrap_or("")),
        }
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    result
}
