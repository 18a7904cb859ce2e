use cp_failover_manager::FailoverEvent;
use cp_idle_manager::IdleEvent;
use cp_job_tracker::JobNotification;
use cp_quota_manager::QuotaEvent;

/// The union of every event a [`crate::ControlPlane`] publishes, merged
/// into one stream by `ControlPlane::subscribe_all` (spec §6 `EventSink`
/// topic list).
#[derive(Debug, Clone)]
pub enum ControlPlaneEvent {
    /// A job lifecycle notification.
    Job(JobNotification),
    /// A quota warning or exceeded event.
    Quota(QuotaEvent),
    /// A region failover transition.
    Failover(FailoverEvent),
    /// A node idle/sleep/wake transition.
    Idle(IdleEvent),
}
