//! Embedding context types.
//!
//! A [`Context`] is built once from a verified signed envelope and describes
//! where the application is embedded and who is looking at it.

use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::VerificationError;

/// Kind of embedding surface the application runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContextType {
    /// Loaded inside the platform's application canvas.
    Canvas,
    /// Loaded as a tab on a page.
    Tab,
    /// Any other embedding surface, kept verbatim.
    Other(String),
}

impl ContextType {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &str {
        match self {
            ContextType::Canvas => "canvas",
            ContextType::Tab => "tab",
            ContextType::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "canvas" => ContextType::Canvas,
            "tab" => ContextType::Tab,
            other => ContextType::Other(other.to_string()),
        })
    }
}

impl From<String> for ContextType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "canvas" => ContextType::Canvas,
            "tab" => ContextType::Tab,
            _ => ContextType::Other(value),
        }
    }
}

impl From<ContextType> for String {
    fn from(value: ContextType) -> Self {
        match value {
            ContextType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// A user's authorization of the application.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Opaque credential.
    pub token: String,

    /// When the platform says the token expires. Informational only.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessGrant {
    /// Create a grant with no known expiry.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    /// Set the expiry.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

impl std::fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGrant")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The person viewing the embedded application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Platform user id. Only present once the user authorized the app.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Present when the user has authorized the application.
    #[serde(default)]
    pub access: Option<AccessGrant>,
}

impl User {
    /// Returns true if the user granted the application an access token.
    pub fn has_access(&self) -> bool {
        self.access.is_some()
    }
}

/// Facts about the page hosting a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFacts {
    pub id: String,
    /// The viewer administers the page.
    pub is_admin: bool,
    /// The viewer likes the page.
    pub is_liked: bool,
    /// Page access grant, when the platform provided one.
    #[serde(default)]
    pub access: Option<AccessGrant>,
}

impl PageFacts {
    /// Facts for a page, defaulting to a non-admin viewer who hasn't liked it.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
            is_liked: false,
            access: None,
        }
    }

    pub fn admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn liked(mut self, is_liked: bool) -> Self {
        self.is_liked = is_liked;
        self
    }
}

/// Verified description of where the application runs and who views it.
///
/// Page facts are only kept for [`ContextType::Tab`] contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    context_type: ContextType,
    user: Option<User>,
    page: Option<PageFacts>,
    issued_at: Option<DateTime<Utc>>,
}

impl Context {
    /// Create a context. Page facts are dropped unless the type is `Tab`.
    pub fn new(context_type: ContextType, user: Option<User>, page: Option<PageFacts>) -> Self {
        let page = match context_type {
            ContextType::Tab => page,
            _ => None,
        };
        Self {
            context_type,
            user,
            page,
            issued_at: None,
        }
    }

    /// A canvas context.
    pub fn canvas(user: Option<User>) -> Self {
        Self::new(ContextType::Canvas, user, None)
    }

    /// A page tab context.
    pub fn tab(user: Option<User>, page: PageFacts) -> Self {
        Self::new(ContextType::Tab, user, Some(page))
    }

    /// Set when the envelope was issued.
    pub fn with_issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    /// Build a context from verified envelope claims.
    ///
    /// Claims carrying a `page` object produce a tab context; everything
    /// else is a canvas context.
    pub fn from_claims(claims: &Claims) -> Result<Self, VerificationError> {
        let payload: Payload = serde_json::from_value(Value::Object(claims.0.clone()))
            .map_err(|e| VerificationError::Payload(e.to_string()))?;

        let access = payload.oauth_token.map(|token| {
            let grant = AccessGrant::new(token);
            match payload.expires.filter(|e| *e > 0).and_then(timestamp) {
                Some(expires_at) => grant.with_expiry(expires_at),
                None => grant,
            }
        });

        let has_user =
            payload.user_id.is_some() || access.is_some() || payload.user.is_some();
        let user = has_user.then(|| {
            let details = payload.user.unwrap_or_default();
            User {
                id: payload.user_id,
                locale: details.locale,
                country: details.country,
                access,
            }
        });

        let context = match payload.page {
            Some(page) => Context::tab(
                user,
                PageFacts {
                    id: page.id,
                    is_admin: page.admin,
                    is_liked: page.liked,
                    access: None,
                },
            ),
            None => Context::canvas(user),
        };

        Ok(match payload.issued_at.and_then(timestamp) {
            Some(issued_at) => context.with_issued_at(issued_at),
            None => context,
        })
    }

    pub fn context_type(&self) -> &ContextType {
        &self.context_type
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Page facts; always `None` outside a tab.
    pub fn page(&self) -> Option<&PageFacts> {
        self.page.as_ref()
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn is_canvas(&self) -> bool {
        self.context_type == ContextType::Canvas
    }

    pub fn is_tab(&self) -> bool {
        self.context_type == ContextType::Tab
    }

    /// Returns true if the current user authorized the application.
    pub fn is_authorized(&self) -> bool {
        self.user.as_ref().is_some_and(User::has_access)
    }

    /// The user's access token, if the user authorized the application.
    pub fn user_token(&self) -> Option<&str> {
        self.user
            .as_ref()
            .and_then(|u| u.access.as_ref())
            .map(|a| a.token.as_str())
    }

    /// Returns true if this is a tab and the viewer administers the page.
    pub fn is_manageable(&self) -> bool {
        self.is_tab() && self.page.as_ref().is_some_and(|p| p.is_admin)
    }
}

/// Verified claims decoded from a signed envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The `algorithm` claim, if present.
    pub fn algorithm(&self) -> Option<&str> {
        self.0.get("algorithm").and_then(Value::as_str)
    }

    /// The `issued_at` claim as a unix timestamp.
    pub fn issued_at(&self) -> Option<i64> {
        self.0.get("issued_at").and_then(Value::as_i64)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl TryFrom<Value> for Claims {
    type Error = VerificationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(VerificationError::Payload(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }
}

/// Live permission state for one access token.
///
/// Absence of a scope is equivalent to "not granted".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionGrantSet {
    scopes: HashMap<String, bool>,
}

impl PermissionGrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scope's granted flag.
    pub fn with_scope(mut self, scope: impl Into<String>, granted: bool) -> Self {
        self.scopes.insert(scope.into(), granted);
        self
    }

    pub fn is_granted(&self, scope: &str) -> bool {
        self.scopes.get(scope).copied().unwrap_or(false)
    }

    /// Required scopes that are not granted, in declaration order without
    /// duplicates. An empty result means every required scope is granted.
    pub fn missing<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for scope in required {
            let scope = scope.as_ref();
            if !self.is_granted(scope) && !missing.iter().any(|m| m == scope) {
                missing.push(scope.to_string());
            }
        }
        missing
    }

    /// Returns true if at least one of the given scopes is granted.
    pub fn grants_any<S: AsRef<str>>(&self, scopes: &[S]) -> bool {
        scopes.iter().any(|s| self.is_granted(s.as_ref()))
    }

    /// Granted scope names, sorted.
    pub fn granted_scopes(&self) -> Vec<&str> {
        let mut granted: Vec<&str> = self
            .scopes
            .iter()
            .filter(|(_, granted)| **granted)
            .map(|(name, _)| name.as_str())
            .collect();
        granted.sort_unstable();
        granted
    }
}

impl From<HashMap<String, bool>> for PermissionGrantSet {
    fn from(scopes: HashMap<String, bool>) -> Self {
        Self { scopes }
    }
}

impl FromIterator<(String, bool)> for PermissionGrantSet {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self {
            scopes: iter.into_iter().collect(),
        }
    }
}

#[derive(Deserialize)]
struct Payload {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    oauth_token: Option<String>,
    #[serde(default)]
    expires: Option<i64>,
    #[serde(default)]
    issued_at: Option<i64>,
    #[serde(default)]
    user: Option<UserClaims>,
    #[serde(default)]
    page: Option<PageClaims>,
}

#[derive(Default, Deserialize)]
struct UserClaims {
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Deserialize)]
struct PageClaims {
    id: String,
    #[serde(default)]
    liked: bool,
    #[serde(default)]
    admin: bool,
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
