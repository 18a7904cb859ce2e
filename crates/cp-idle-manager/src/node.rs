use cp_types::NodeId;
use serde::{Deserialize, Serialize};

/// A node's place in the idle/sleep lifecycle (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Serving work.
    Active,
    /// Not serving work, but not yet asleep.
    Idle,
    /// Powered down / parked to save cost.
    Sleeping,
    /// Mid-transition back to `Active`, waiting out `wakeUpTimeMs`.
    Waking,
}

/// Per-node idle/sleep tracking state (spec §3 `IdleNodeEntry`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleNodeEntry {
    /// The node being tracked.
    pub node_id: NodeId,
    /// Current lifecycle state.
    pub state: NodeState,
    /// Unix epoch milliseconds since the node went idle, non-null iff `state = Idle`.
    pub idle_since: Option<i64>,
    /// Unix epoch milliseconds since the node went to sleep, non-null iff
    /// `state ∈ {Sleeping, Waking}`.
    pub sleeping_since: Option<i64>,
    /// Cumulative milliseconds spent sleeping, across all sleep segments.
    pub total_sleep_time_ms: i64,
    /// Hourly cost, in cents, used for savings accounting.
    pub cost_per_hour_cents: i64,
    /// Cumulative estimated savings, in cents.
    pub estimated_savings_cents: i64,
    /// Whether `checkIdleNodes` may automatically sleep this node.
    pub auto_sleep_enabled: bool,
}

impl IdleNodeEntry {
    pub(crate) fn new(node_id: NodeId, cost_per_hour_cents: i64, auto_sleep_enabled: bool) -> Self {
        Self {
            node_id,
            state: NodeState::Active,
            idle_since: None,
            sleeping_since: None,
            total_sleep_time_ms: 0,
            cost_per_hour_cents,
            estimated_savings_cents: 0,
            auto_sleep_enabled,
        }
    }
}
