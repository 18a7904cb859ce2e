use cp_types::JobId;
use serde::{Deserialize, Serialize};

/// Kind of lifecycle event a [`JobNotification`] reports (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// The job transitioned to `running`.
    Started,
    /// The job transitioned to `success`.
    Completed,
    /// The job transitioned to `failed`.
    Failed,
    /// The job's progress was updated.
    Progress,
    /// The job transitioned to `cancelled`.
    Cancelled,
}

/// A notification published on a job lifecycle transition.
///
/// Per spec §4.1/§5, notifications for the same `job_id` are delivered in
/// the order of the transitions that produced them: every [`JobTracker`]
/// mutator emits its notification under the same lock acquisition that
/// performed the mutation, so two callers racing on different jobs may
/// interleave arbitrarily but a single job's own notifications never do.
///
/// [`JobTracker`]: crate::JobTracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNotification {
    /// The job the notification is about.
    pub job_id: JobId,
    /// What happened.
    pub event: NotificationKind,
    /// Unix epoch milliseconds when the transition occurred.
    pub timestamp: i64,
    /// Human-readable summary.
    pub message: String,
}
