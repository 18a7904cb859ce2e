#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Authoritative job lifecycle tracker (spec §4.1).
//!
//! Owns every job from `track()` through a terminal transition, after which
//! the job is archived into a capped history ring buffer and becomes
//! read-only. Mutation happens only through [`JobTracker`]'s methods; the
//! [`Job`]/[`ArchivedJob`] data types carry no mutators of their own, the
//! same way the teacher crate's `WorkerSnapshot`/`JobOutcome` are plain data
//! returned by value from `EngineRuntime`.

mod job;
mod notification;
mod tracker;

pub use job::{ArchivedJob, Job, JobStatus, ResourceUsage};
pub use notification::{JobNotification, NotificationKind};
pub use tracker::{JobStats, JobTracker, JobTrackerConfig, TrackError};
