//! Authorization gate for applications embedded in a social platform canvas
//! or page tab.
//!
//! The platform loads an embedded application inside an iframe and posts a
//! `signed_request` describing who is looking at it and where. This crate
//! turns that envelope into a [`Context`], keeps it for the rest of the
//! session, and decides, route by route, whether a request may proceed.
//!
//! # Gates
//!
//! Each route declares [`Requirements`]. Four gates enforce them in a fixed
//! order ([`Gate::ORDER`]), stopping at the first failure:
//!
//! 1. **Context** - the stored context has an accepted type
//! 2. **Authentication** - the user authorized the app; outbound calls
//!    switch to the user's token
//! 3. **Permission** - the user's token holds every required scope
//! 4. **Page admin** - the viewer administers the page hosting the tab
//!
//! An undeclared requirement skips its gate entirely.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use canvasgate_core::{
//!     ApplicationConfig, ContextType, GateRequest, LogHook, Pipeline, Requirements,
//!     SessionId, StaticRequirements,
//! };
//! # use canvasgate_core::{PermissionGrantSet, PermissionOracle, TransportError};
//! # struct Oracle;
//! # #[async_trait::async_trait]
//! # impl PermissionOracle for Oracle {
//! #     async fn fetch_granted(&self, _: &str) -> Result<PermissionGrantSet, TransportError> {
//! #         Ok(PermissionGrantSet::new())
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let routes = StaticRequirements::new()
//!         .route("/tab", Requirements::none().contexts([ContextType::Tab]).page_admin())
//!         .route(
//!             "/publish",
//!             Requirements::none().authorization().permissions(["publish_stream"]),
//!         );
//!
//!     let pipeline = Pipeline::builder(ApplicationConfig::from_env()?)
//!         .oracle(Oracle)
//!         .requirements(routes)
//!         .hook(LogHook)
//!         .build()?;
//!
//!     let request = GateRequest::new(SessionId::generate(), "/publish");
//!     match pipeline.authorize(request).await {
//!         Ok(authorized) => println!("calling the platform with {:?}", authorized.credentials()),
//!         Err(e) if e.is_routine() => println!("rejected: {}", e),
//!         Err(e) => return Err(e.into()),
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod gate;
pub mod login;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{
    load_config_file, ApplicationConfig, ApplicationConfigBuilder, ConfigError, GateConfig,
    VerificationFailurePolicy,
};
pub use context::{
    AccessGrant, Claims, Context, ContextStore, ContextType, HmacSignedRequestVerifier,
    MemoryContextStore, PageFacts, PermissionGrantSet, SessionId, SignedRequestVerifier, User,
    DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL,
};
pub use error::{
    AuthorizationError, ContextError, GateError, StoreError, TransportError, VerificationError,
};
pub use events::{GateEvent, GateHook, LogHook, NoopHook};
#[cfg(feature = "graph")]
pub use gate::GraphPermissionOracle;
pub use gate::{
    Authorized, Gate, GateOutcome, GateRequest, PermissionOracle, Pipeline, PipelineBuilder,
    RequestCredentials, RequirementSource, Requirements, StaticRequirements, TokenSource,
};
pub use login::{LoginUrl, Redirect, RedirectMode};
