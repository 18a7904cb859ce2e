#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Shared types and collaborator traits for the cluster control plane core.
//!
//! `cp-types` holds nothing with behavior of its own beyond small value
//! types: opaque identifiers, the `Clock`/`IdGenerator` collaborator traits
//! each component is constructed with, and the crate-wide configuration
//! error. Every other component (`cp-job-tracker`, `cp-artifact-store`,
//! `cp-quota-manager`, `cp-failover-manager`, `cp-idle-manager`) depends on
//! this crate and nothing else in the workspace.

mod clock;
mod error;
mod ids;
mod idgen;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ConfigError;
pub use idgen::{IdGenerator, RandomIdGenerator};
pub use ids::{ArtifactId, EntityId, JobId, NodeId, RegionId};
