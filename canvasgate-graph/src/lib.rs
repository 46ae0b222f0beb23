//! Minimal Graph API client for canvasgate
//!
//! This crate provides the handful of Graph calls the authorization gate
//! needs: looking up which permission scopes a user granted, and reading the
//! token owner's profile.
//!
//! # Quick Start
//!
//! ```no_run
//! use canvasgate_graph::Graph;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Graph::builder().api_version("v19.0").build()?;
//!
//! let granted = graph.permissions("user-access-token").await?;
//! if granted.get("email") == Some(&true) {
//!     println!("email scope granted");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Retries
//!
//! Throttling, 5xx and network failures are retried with exponential
//! backoff. Disable with [`RetryConfig::disabled`]:
//!
//! ```no_run
//! use canvasgate_graph::{Graph, RetryConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let graph = Graph::builder()
//!     .retry_config(RetryConfig::disabled())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod permissions;

pub use client::{Graph, GraphBuilder, Profile};
pub use error::{ApiError, ApiErrorResponse, GraphError, RetryConfig};
pub use permissions::{parse_permissions, PermissionMap};
