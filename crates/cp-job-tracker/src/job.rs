use std::collections::BTreeMap;

use cp_types::{EntityId, JobId, NodeId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a job (spec §3 `Job.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Created, not yet handed to a broker/queue.
    Pending,
    /// Admitted to a broker queue, awaiting a worker (spec §9 open question:
    /// reserved for adapters; this crate never produces it on its own).
    Queued,
    /// Assigned to a node and executing.
    Running,
    /// Completed successfully.
    Success,
    /// Completed with a failure.
    Failed,
    /// Cancelled by the caller before completion.
    Cancelled,
    /// Exceeded an externally enforced timeout.
    TimedOut,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions permitted).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }
}

/// Resource accounting for a job (spec §3 `Job.resourceUsage`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Total CPU time consumed, in milliseconds.
    pub cpu_time_ms: u64,
    /// Peak resident memory observed, in bytes.
    pub peak_memory_bytes: u64,
    /// Size of the job's output, in bytes.
    pub output_size_bytes: u64,
}

/// A job record (spec §3 `Job`).
///
/// Returned by value everywhere in this crate's public API: mutating a
/// caller's copy never affects tracker state, matching spec §5's "Metadata
/// is returned by value (immutable snapshot)" rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub job_id: JobId,
    /// Caller-defined job type (e.g. `"build"`).
    pub job_type: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Progress percentage, always within `[0, 100]`.
    pub progress: u8,
    /// Node currently (or most recently) executing the job.
    pub node_id: Option<NodeId>,
    /// Creation time, Unix epoch milliseconds.
    pub created_at: i64,
    /// Start time, Unix epoch milliseconds, set by `mark_started`.
    pub started_at: Option<i64>,
    /// Completion time, Unix epoch milliseconds, set on terminal transition.
    pub completed_at: Option<i64>,
    /// `completed_at - started_at`, when both are set.
    pub duration_ms: Option<i64>,
    /// Resource accounting.
    pub resource_usage: ResourceUsage,
    /// Output payload, when the job produced one.
    pub output: Option<String>,
    /// Process exit code, set on terminal transition.
    pub exit_code: Option<i32>,
    /// Owning principal, if any.
    pub user_id: Option<EntityId>,
    /// Caller-defined metadata.
    pub metadata: BTreeMap<String, String>,
}

impl Job {
    pub(crate) fn new(
        job_id: JobId,
        job_type: String,
        user_id: Option<EntityId>,
        metadata: BTreeMap<String, String>,
        created_at: i64,
    ) -> Self {
        Self {
            job_id,
            job_type,
            status: JobStatus::Pending,
            progress: 0,
            node_id: None,
            created_at,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            resource_usage: ResourceUsage::default(),
            output: None,
            exit_code: None,
            user_id,
            metadata,
        }
    }
}

/// A job that has reached a terminal status and is now archived.
///
/// `ArchivedJob` deliberately exposes no `&mut` access: once a [`Job`]
/// becomes terminal it is wrapped here and moved into the tracker's history
/// buffer, so "no further mutation after terminal" (spec §3 invariant, §8
/// property 4) is a property the type system documents rather than
/// something every call site has to remember to check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedJob(Job);

impl ArchivedJob {
    pub(crate) fn new(job: Job) -> Self {
        debug_assert!(job.status.is_terminal());
        Self(job)
    }

    /// Borrows the archived job's data.
    pub fn job(&self) -> &Job {
        &self.0
    }

    /// Consumes the wrapper, returning an owned snapshot of the job data.
    pub fn into_job(self) -> Job {
        self.0
    }
}
