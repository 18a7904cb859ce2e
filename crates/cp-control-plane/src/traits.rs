use cp_types::{NodeId, RegionId};

/// Liveness classification for a [`NodeRegistry`] entry. Distinct from
/// [`cp_idle_manager::NodeState`]: this describes what an external fleet
/// manager reports about a node, not the idle/sleep bookkeeping this crate
/// owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Heartbeating and accepting work.
    Live,
    /// Heartbeating but being drained of work.
    Draining,
    /// Not heartbeating.
    Offline,
}

/// A node as reported by an external fleet registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// The node's identifier.
    pub node_id: NodeId,
    /// Region the node belongs to, if known.
    pub region_id: Option<RegionId>,
    /// Unix epoch milliseconds of the node's last heartbeat.
    pub heartbeat_at: i64,
    /// Concurrent job capacity.
    pub capacity: u32,
    /// Reported liveness.
    pub status: NodeStatus,
}

/// Lookup of live nodes, backed by whatever fleet inventory the deployment
/// uses (spec §6 `NodeRegistry`). The core only reads through this
/// interface; it never owns node inventory itself.
pub trait NodeRegistry: Send + Sync {
    /// Lists nodes, optionally filtered to one status.
    fn list_nodes(&self, status: Option<NodeStatus>) -> Vec<NodeInfo>;
    /// Looks up a single node.
    fn get(&self, node_id: &NodeId) -> Option<NodeInfo>;
}

/// A producer of health-check results for one region, polled at
/// `RegionFailoverConfig::check_interval_ms` cadence by whatever adapter
/// owns the probing loop (spec §6 `HealthProbe`).
///
/// The core does not run this loop itself — only
/// `FailoverManager::process_health_check` is core surface. A probe
/// implementation is handed to an adapter, not to
/// [`crate::ControlPlane`].
pub trait HealthProbe: Send + Sync {
    /// Runs one health check against `region_id`.
    fn probe(&self, region_id: &RegionId) -> cp_failover_manager::HealthCheckResult;
}

/// Receives every event published across the five components (spec §6
/// `EventSink`): `notification`, `failover:event`, `quota:warning`,
/// `quota:exceeded`, `node:idle`, `node:active`, `node:sleeping`,
/// `node:waking`, `node:awake`.
pub trait EventSink: Send + Sync {
    /// Handles one published event.
    fn handle(&self, event: crate::event::ControlPlaneEvent);
}
