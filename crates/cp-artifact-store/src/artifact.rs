use std::collections::BTreeMap;

use cp_types::{ArtifactId, JobId};
use serde::{Deserialize, Serialize};

/// Artifact metadata, without its content (spec §3 `Artifact`, minus
/// `content`).
///
/// This is what `list_by_job` and `get_stats` deal in; bulk-copying every
/// stored blob just to list a job's artifacts would defeat the point of a
/// bounded store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Unique artifact identifier, assigned by `store()`.
    pub artifact_id: ArtifactId,
    /// Job that produced this artifact.
    pub job_id: JobId,
    /// Caller-supplied artifact name.
    pub name: String,
    /// MIME content type.
    pub content_type: String,
    /// Size of `content` in bytes.
    pub size_bytes: u64,
    /// Unix epoch milliseconds when the artifact was stored.
    pub stored_at: i64,
    /// Unix epoch milliseconds after which the artifact is eligible for
    /// expiry, if any.
    pub expires_at: Option<i64>,
    /// Lowercase hex SHA-256 of `content`.
    pub checksum: String,
    /// Caller-supplied labels.
    pub labels: BTreeMap<String, String>,
}

/// A stored artifact, with its content (spec §3 `Artifact`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Metadata about the artifact.
    pub metadata: ArtifactMetadata,
    /// The artifact's content.
    pub content: Vec<u8>,
}
