//! Gate error taxonomy
//!
//! Every failure the pipeline can surface is a [`GateError`]. The first four
//! kinds are routine rejections caused by the request; `Configuration` is a
//! route-authoring mistake and is the only fatal kind. The remaining
//! variants wrap failures of external collaborators unchanged.

use thiserror::Error;

use crate::context::ContextType;

/// Why the context-type gate rejected a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No context was ever resolved for this application in this session.
    #[error("Application is not in an embedding context")]
    Missing,

    /// A context exists but its type is not accepted by the route.
    #[error(
        "Not acceptable context \"{actual}\". Contexts allowed: [ {} ]",
        join_types(.allowed)
    )]
    NotAllowed {
        /// Type of the stored context.
        actual: ContextType,
        /// Types the route accepts.
        allowed: Vec<ContextType>,
    },
}

/// Why the authentication gate (or the permission gate's token lookup)
/// rejected a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// The current user has not authorized the application.
    #[error("Application is not authorized by the current user")]
    NotAuthorized,

    /// A permission check was attempted without any access grant.
    #[error("Unable to check permissions since the user didn't allow the application")]
    NoAccessGrant,
}

/// Failures of the signed-envelope decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// The envelope is not `<signature>.<payload>`.
    #[error("Malformed signed request: {0}")]
    Malformed(String),

    /// A segment is not valid base64url.
    #[error("Invalid signed request encoding: {0}")]
    Encoding(String),

    /// The payload is not a JSON object with the expected claims.
    #[error("Invalid signed request payload: {0}")]
    Payload(String),

    /// The envelope declares an algorithm other than HMAC-SHA256.
    #[error("Unsupported signed request algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature does not match the payload.
    #[error("Signed request signature mismatch")]
    SignatureMismatch,

    /// The envelope was issued too long ago.
    #[error("Signed request expired (issued {age_secs}s ago)")]
    Expired {
        /// Age of the envelope in seconds.
        age_secs: i64,
    },
}

/// Failures of the permission oracle's transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The platform rejected the access token.
    #[error("Access token rejected: {0}")]
    TokenRejected(String),

    /// The platform could not be reached or answered with a server error.
    #[error("Platform unavailable: {0}")]
    Unavailable(String),

    /// The platform answered with something unparseable.
    #[error("Invalid platform response: {0}")]
    InvalidResponse(String),
}

#[cfg(feature = "graph")]
impl From<canvasgate_graph::GraphError> for TransportError {
    fn from(err: canvasgate_graph::GraphError) -> Self {
        use canvasgate_graph::GraphError;

        match err {
            GraphError::Authentication(msg) => TransportError::TokenRejected(msg),
            GraphError::InvalidResponse(msg) => TransportError::InvalidResponse(msg),
            GraphError::Json(e) => TransportError::InvalidResponse(e.to_string()),
            other => TransportError::Unavailable(other.to_string()),
        }
    }
}

/// Failures of the session-scoped context store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not be read or written.
    #[error("Context store unavailable: {0}")]
    Unavailable(String),

    /// A stored context could not be encoded or decoded.
    #[error("Context store serialization error: {0}")]
    Serialization(String),
}

/// A failed gate, or a failed collaborator call made on behalf of a gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// No context, or a context of the wrong type.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The user has not authorized the application.
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// One or more required scopes are not granted.
    #[error("Insufficient permissions. Permissions required: [ {} ]", .missing.join(", "))]
    Permission {
        /// Every required scope that is not granted, in declaration order.
        missing: Vec<String>,
    },

    /// The user is not an administrator of the page.
    #[error("Access restricted to the page admin")]
    Role,

    /// The route's declared requirements cannot be evaluated.
    #[error("Route configuration error: {0}")]
    Configuration(String),

    /// The permission oracle failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The signed envelope failed verification.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// The context store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GateError {
    /// Stable lowercase name of the error kind, used in logs and response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Context(_) => "context",
            GateError::Authorization(_) => "authorization",
            GateError::Permission { .. } => "permission",
            GateError::Role => "role",
            GateError::Configuration(_) => "configuration",
            GateError::Transport(_) => "transport",
            GateError::Verification(_) => "verification",
            GateError::Store(_) => "store",
        }
    }

    /// Returns true for route-authoring mistakes that must not be masked as
    /// a routine rejection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GateError::Configuration(_))
    }

    /// Returns true for request-caused security rejections.
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            GateError::Context(_)
                | GateError::Authorization(_)
                | GateError::Permission { .. }
                | GateError::Role
        )
    }

    /// Missing scopes, when this is a permission failure.
    pub fn missing_permissions(&self) -> Option<&[String]> {
        match self {
            GateError::Permission { missing } => Some(missing),
            _ => None,
        }
    }
}

fn join_types(types: &[ContextType]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_not_allowed_message_lists_types() {
        let err = ContextError::NotAllowed {
            actual: ContextType::Canvas,
            allowed: vec![ContextType::Tab, ContextType::Other("website".into())],
        };
        assert_eq!(
            err.to_string(),
            "Not acceptable context \"canvas\". Contexts allowed: [ tab, website ]"
        );
    }

    #[test]
    fn test_permission_message_lists_every_missing_scope() {
        let err = GateError::Permission {
            missing: vec!["publish_stream".into(), "email".into()],
        };
        assert_eq!(
            err.to_string(),
            "Insufficient permissions. Permissions required: [ publish_stream, email ]"
        );
        assert_eq!(
            err.missing_permissions(),
            Some(&["publish_stream".to_string(), "email".to_string()][..])
        );
    }

    #[test]
    fn test_kinds() {
        let cases: Vec<(GateError, &str)> = vec![
            (ContextError::Missing.into(), "context"),
            (AuthorizationError::NotAuthorized.into(), "authorization"),
            (GateError::Permission { missing: vec![] }, "permission"),
            (GateError::Role, "role"),
            (GateError::Configuration("x".into()), "configuration"),
            (TransportError::Unavailable("x".into()).into(), "transport"),
            (VerificationError::SignatureMismatch.into(), "verification"),
            (StoreError::Unavailable("x".into()).into(), "store"),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(GateError::Configuration("x".into()).is_fatal());
        assert!(!GateError::Configuration("x".into()).is_routine());
        assert!(!GateError::Role.is_fatal());
        assert!(GateError::Role.is_routine());
        assert!(!GateError::from(ContextError::Missing).is_fatal());
        assert!(!GateError::from(TransportError::Unavailable("x".into())).is_routine());
    }

    #[test]
    fn test_transparent_display() {
        let err: GateError = AuthorizationError::NoAccessGrant.into();
        assert_eq!(
            err.to_string(),
            "Unable to check permissions since the user didn't allow the application"
        );
    }
}
