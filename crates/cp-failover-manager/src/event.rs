use cp_types::RegionId;
use serde::{Deserialize, Serialize};

use crate::region::FailoverState;

/// A single health probe result fed into `processHealthCheck` (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Region the probe ran against.
    pub region_id: RegionId,
    /// Whether the probe succeeded.
    pub healthy: bool,
    /// Unix epoch milliseconds the probe completed at.
    pub timestamp: i64,
    /// How long the probe took to complete, in milliseconds.
    pub response_time_ms: u64,
    /// Number of nodes in the region that responded healthy.
    pub healthy_nodes: u32,
    /// Total number of nodes probed in the region.
    pub total_nodes: u32,
    /// Optional probe detail, e.g. an error message on failure.
    pub message: Option<String>,
}

/// One state-machine transition, appended to a region's event log (spec
/// §4.4 "Event log").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverEvent {
    /// Region that was serving traffic before this transition.
    pub from_region: RegionId,
    /// Region serving traffic after this transition.
    pub to_region: RegionId,
    /// The state reached by this transition.
    pub state: FailoverState,
    /// Why the transition happened, if not purely counter-driven.
    pub reason: Option<String>,
    /// Unix epoch milliseconds the transition was recorded at.
    pub timestamp: i64,
}
