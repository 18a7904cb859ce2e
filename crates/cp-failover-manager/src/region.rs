use cp_types::RegionId;
use serde::{Deserialize, Serialize};

/// A region's place in the failover state machine (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailoverState {
    /// Serving traffic normally.
    Normal,
    /// Experiencing failures but not yet past the failover threshold.
    Degraded,
    /// Mid-transition to `FailedOver`. Never observed at rest; reported
    /// only inside the event log for the composite transition.
    FailingOver,
    /// Traffic routed to the backup region.
    FailedOver,
    /// Mid-transition back to `Normal`. Never observed at rest; reported
    /// only inside the event log for the composite transition.
    FailingBack,
}

/// Static configuration for one region's failover behavior (spec §3
/// `RegionFailoverState.config`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionFailoverConfig {
    /// The region being monitored.
    pub region_id: RegionId,
    /// Region to route to while `state = FailedOver`.
    pub backup_region_id: RegionId,
    /// Consecutive failures required to fail over. Must be positive;
    /// `Degraded` triggers at `ceil(failure_threshold / 2)`.
    pub failure_threshold: u32,
    /// Expected interval between health checks, in milliseconds. Informational
    /// for callers scheduling probes; not enforced by this crate.
    pub check_interval_ms: u64,
    /// Minimum time a region must stay `FailedOver` before failback is
    /// considered, in milliseconds.
    pub failback_delay_ms: u64,
    /// Consecutive successes required, alongside `failback_delay_ms`,
    /// before failing back.
    pub recovery_threshold: u32,
}

/// Live state for one monitored region (spec §3 `RegionFailoverState`,
/// minus its event log — fetch that separately via `get_events`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionFailoverState {
    /// This region's configuration.
    pub config: RegionFailoverConfig,
    /// Current state.
    pub state: FailoverState,
    /// Consecutive unhealthy checks since the last healthy one.
    pub consecutive_failures: u32,
    /// Consecutive healthy checks since the last unhealthy one.
    pub consecutive_successes: u32,
    /// Unix epoch milliseconds of the failover, non-null iff `state = FailedOver`.
    pub failed_over_at: Option<i64>,
    /// Unix epoch milliseconds of the most recent health check.
    pub last_check_at: Option<i64>,
}

impl RegionFailoverState {
    pub(crate) fn new(config: RegionFailoverConfig) -> Self {
        Self {
            config,
            state: FailoverState::Normal,
            consecutive_failures: 0,
            consecutive_successes: 0,
            failed_over_at: None,
            last_check_at: None,
        }
    }
}
