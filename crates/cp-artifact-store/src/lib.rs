#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Bounded, content-addressed artifact store (spec §4.2).
//!
//! Artifacts are immutable once stored: `content` is accepted by value and
//! never mutated, matching spec §5's "callers must not mutate a buffer
//! after `store()` accepts it" rule — the store takes ownership of the
//! `Vec<u8>` it is given. Metadata is always returned by value.

mod artifact;
mod store;

pub use artifact::{Artifact, ArtifactMetadata};
pub use store::{ArtifactStats, ArtifactStore, ArtifactStoreConfig};
