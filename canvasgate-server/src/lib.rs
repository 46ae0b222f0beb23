//! HTTP surface for the canvasgate authorization pipeline.
//!
//! Wraps axum routes in a middleware that pulls the `signed_request` out of
//! canvas and page-tab form posts, keys the request to a cookie session, and
//! runs the [`Pipeline`](canvasgate_core::Pipeline) before the handler sees
//! anything. Handlers read the outcome through [`GateContext`].
//!
//! Rejections become JSON errors (`{"error", "kind", "code"}`), or a login
//! redirect when [`GateRouter::redirect_unauthorized`] is on.
//!
//! # Features
//!
//! - `graph` - Query granted permissions from the Graph API by default
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::routing::post;
//! use canvasgate_core::{ApplicationConfig, Pipeline, Requirements};
//! use canvasgate_server::{GateContext, GateRouter};
//!
//! async fn home(GateContext(authorized): GateContext) -> String {
//!     format!("context: {:?}", authorized.context().map(|c| c.context_type()))
//! }
//!
//! # async fn example(pipeline: Pipeline) -> Result<(), Box<dyn std::error::Error>> {
//! let app = GateRouter::new(pipeline)
//!     .route("/", post(home), Requirements::none().authorization())
//!     .with_login("/login")
//!     .build()?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod router;
pub(crate) mod state;

// Re-exports
pub use error::{BuildError, ServerError, ServerResult};
pub use extract::GateContext;
pub use middleware::SIGNED_REQUEST_FIELD;
pub use response::LoginRedirect;
pub use router::GateRouter;
pub use state::{DEFAULT_MAX_BODY_BYTES, DEFAULT_SESSION_COOKIE};
