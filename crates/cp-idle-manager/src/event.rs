use cp_types::NodeId;

/// Which lifecycle signal an [`IdleEvent`] reports (spec §6 `EventSink`
/// topics `node:idle`, `node:active`, `node:sleeping`, `node:waking`,
/// `node:awake`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEventKind {
    /// Node transitioned to `Idle`.
    Idle,
    /// Node transitioned to `Active`.
    Active,
    /// Node transitioned to `Sleeping`.
    Sleeping,
    /// Node transitioned to `Waking`.
    Waking,
    /// Node completed its delayed `Waking → Active` transition.
    Awake,
}

/// A single idle/sleep lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleEvent {
    /// Node the transition applies to.
    pub node_id: NodeId,
    /// Which transition occurred.
    pub kind: IdleEventKind,
    /// Unix epoch milliseconds the transition was recorded at.
    pub timestamp: i64,
}
