//! Handler access to the gate's decision.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use canvasgate_core::Authorized;

use crate::error::ServerError;

/// Extractor for the [`Authorized`] result of the gate middleware.
///
/// Fails with a 500 when used on a route that is not gated.
///
/// ```rust,no_run
/// use canvasgate_server::GateContext;
///
/// async fn feed(GateContext(authorized): GateContext) -> String {
///     format!("calling the platform with {:?}", authorized.credentials())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct GateContext(pub Authorized);

#[async_trait]
impl<S> FromRequestParts<S> for GateContext
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authorized>()
            .cloned()
            .map(GateContext)
            .ok_or_else(|| {
                ServerError::Internal("GateContext used on a route without the gate".to_string())
            })
    }
}
