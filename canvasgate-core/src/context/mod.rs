//! Embedding context: what it is, how it is verified, where it is kept.
//!
//! - **[`Context`]**: verified description of the embedding surface and viewer
//! - **[`SignedRequestVerifier`]**: turns a raw signed envelope into [`Claims`]
//! - **[`ContextStore`]**: session-scoped storage, one context per application
//! - **[`PermissionGrantSet`]**: live scope state for an access token

mod model;
mod signed_request;
mod store;

pub use model::{AccessGrant, Claims, Context, ContextType, PageFacts, PermissionGrantSet, User};
pub use signed_request::{
    HmacSignedRequestVerifier, SignedRequestVerifier, SIGNED_REQUEST_ALGORITHM,
};
pub use store::{
    storage_key, ContextStore, MemoryContextStore, SessionId, DEFAULT_MAX_SESSIONS,
    DEFAULT_SESSION_TTL,
};
