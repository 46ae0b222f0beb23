//! Route requirements and the gates that enforce them.

mod credentials;
mod oracle;
mod pipeline;
mod requirements;

pub use credentials::{RequestCredentials, TokenSource};
#[cfg(feature = "graph")]
pub use oracle::GraphPermissionOracle;
pub use oracle::PermissionOracle;
pub use pipeline::{Authorized, Gate, GateOutcome, GateRequest, Pipeline, PipelineBuilder};
pub use requirements::{RequirementSource, Requirements, StaticRequirements};
