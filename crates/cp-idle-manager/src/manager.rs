use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cp_types::{Clock, ConfigError, NodeId};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use crate::event::{IdleEvent, IdleEventKind};
use crate::node::{IdleNodeEntry, NodeState};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const MS_PER_HOUR: f64 = 3_600_000.0;

/// Tunables for [`IdleManager`] (spec §4.5 "Defaults").
#[derive(Debug, Clone, Copy)]
pub struct IdleManagerConfig {
    /// Idle duration after which an auto-sleep-enabled node is put to sleep.
    pub idle_timeout_ms: i64,
    /// Minimum time a node must stay asleep before `wake` is honored.
    pub min_sleep_duration_ms: i64,
    /// Delay between `wake` accepting and the node reaching `Active`.
    pub wake_up_time_ms: i64,
    /// Hourly cost assumed for `registerNode` calls that don't specify one.
    pub default_cost_per_hour_cents: i64,
}

impl Default for IdleManagerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 300_000,
            min_sleep_duration_ms: 60_000,
            wake_up_time_ms: 30_000,
            default_cost_per_hour_cents: 5,
        }
    }
}

struct Inner {
    config: IdleManagerConfig,
    clock: Arc<dyn Clock>,
    nodes: Mutex<HashMap<NodeId, IdleNodeEntry>>,
    wake_timers: Mutex<HashMap<NodeId, JoinHandle<()>>>,
    events: broadcast::Sender<IdleEvent>,
    idle_check_stop: AtomicBool,
    idle_check_notify: Notify,
    idle_check_task: Mutex<Option<JoinHandle<()>>>,
}

/// Tracks idle/sleep lifecycle and cost savings per node (spec §4.5).
#[derive(Clone)]
pub struct IdleManager {
    inner: Arc<Inner>,
}

impl IdleManager {
    /// Builds an empty idle manager.
    ///
    /// Refuses a non-positive `idle_timeout_ms`, `min_sleep_duration_ms`, or
    /// `wake_up_time_ms` (spec §7 "Configuration error").
    pub fn new(config: IdleManagerConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        ConfigError::require_positive("idle_timeout_ms", config.idle_timeout_ms)?;
        ConfigError::require_positive("min_sleep_duration_ms", config.min_sleep_duration_ms)?;
        ConfigError::require_positive("wake_up_time_ms", config.wake_up_time_ms)?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                clock,
                nodes: Mutex::new(HashMap::new()),
                wake_timers: Mutex::new(HashMap::new()),
                events,
                idle_check_stop: AtomicBool::new(false),
                idle_check_notify: Notify::new(),
                idle_check_task: Mutex::new(None),
            }),
        })
    }

    /// Subscribes to `node:*` lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<IdleEvent> {
        self.inner.events.subscribe()
    }

    /// Registers a node in `Active` state.
    pub fn register_node(&self, node_id: NodeId, cost_per_hour_cents: Option<i64>, auto_sleep_enabled: bool) {
        let cost = cost_per_hour_cents.unwrap_or(self.inner.config.default_cost_per_hour_cents);
        let mut nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
        nodes.insert(node_id.clone(), IdleNodeEntry::new(node_id, cost, auto_sleep_enabled));
    }

    /// Removes a node and cancels any pending delayed wake for it.
    pub fn unregister_node(&self, node_id: &NodeId) -> bool {
        let mut nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
        let existed = nodes.remove(node_id).is_some();
        drop(nodes);
        if let Some(handle) = self.inner.wake_timers.lock().expect("wake timer lock poisoned").remove(node_id) {
            handle.abort();
        }
        existed
    }

    /// Transitions a node `Active → Idle`. No-op if not currently `Active`.
    pub fn mark_idle(&self, node_id: &NodeId) -> bool {
        let now = self.inner.clock.now_ms();
        let mut nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
        let Some(node) = nodes.get_mut(node_id) else { return false };
        if node.state != NodeState::Active {
            return false;
        }
        node.state = NodeState::Idle;
        node.idle_since = Some(now);
        self.emit(node_id.clone(), IdleEventKind::Idle, now);
        true
    }

    /// Transitions a node to `Active` from any state. Accumulates a sleep
    /// segment's savings when leaving `Sleeping` directly (not `Waking`,
    /// whose segment was already accounted for by `wake`).
    pub fn mark_active(&self, node_id: &NodeId) -> bool {
        let now = self.inner.clock.now_ms();
        let mut nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
        let Some(node) = nodes.get_mut(node_id) else { return false };

        match node.state {
            NodeState::Active => return true,
            NodeState::Sleeping => accumulate_savings(node, now),
            NodeState::Waking | NodeState::Idle => {}
        }

        node.state = NodeState::Active;
        node.idle_since = None;
        node.sleeping_since = None;

        if let Some(handle) = self.inner.wake_timers.lock().expect("wake timer lock poisoned").remove(node_id) {
            handle.abort();
        }
        self.emit(node_id.clone(), IdleEventKind::Active, now);
        true
    }

    /// Transitions a node `Idle → Sleeping`. No-op if not currently `Idle`.
    pub fn sleep(&self, node_id: &NodeId) -> bool {
        let now = self.inner.clock.now_ms();
        let mut nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
        let Some(node) = nodes.get_mut(node_id) else { return false };
        if node.state != NodeState::Idle {
            return false;
        }
        node.state = NodeState::Sleeping;
        node.sleeping_since = Some(now);
        node.idle_since = None;
        self.emit(node_id.clone(), IdleEventKind::Sleeping, now);
        true
    }

    /// Wakes a sleeping node. Rejects (returns `false`, no state change) if
    /// fewer than `min_sleep_duration_ms` have elapsed since `sleeping_since`.
    pub fn wake(&self, node_id: &NodeId) -> bool {
        let now = self.inner.clock.now_ms();
        let mut nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
        let Some(node) = nodes.get_mut(node_id) else { return false };
        if node.state != NodeState::Sleeping {
            return false;
        }
        let sleeping_since = node.sleeping_since.expect("Sleeping implies sleeping_since is set");
        if now - sleeping_since < self.inner.config.min_sleep_duration_ms {
            return false;
        }

        accumulate_savings(node, now);
        node.state = NodeState::Waking;

        self.emit(node_id.clone(), IdleEventKind::Waking, now);
        self.schedule_wake_completion(node_id.clone());
        true
    }

    fn schedule_wake_completion(&self, node_id: NodeId) {
        let manager = self.clone();
        let delay = std::time::Duration::from_millis(self.inner.config.wake_up_time_ms.max(0) as u64);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.complete_wake(&node_id);
        });
        if let Some(previous) = self
            .inner
            .wake_timers
            .lock()
            .expect("wake timer lock poisoned")
            .insert(node_id, handle)
        {
            previous.abort();
        }
    }

    fn complete_wake(&self, node_id: &NodeId) {
        let now = self.inner.clock.now_ms();
        let mut nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
        let Some(node) = nodes.get_mut(node_id) else { return };
        if node.state != NodeState::Waking {
            return;
        }
        node.state = NodeState::Active;
        node.sleeping_since = None;
        node.idle_since = None;

        self.inner.wake_timers.lock().expect("wake timer lock poisoned").remove(node_id);
        self.emit(node_id.clone(), IdleEventKind::Awake, now);
    }

    /// Sleeps every `Idle`, auto-sleep-enabled node that has been idle for
    /// at least `idle_timeout_ms`. Returns the nodes sent to sleep.
    pub fn check_idle_nodes(&self) -> Vec<NodeId> {
        let now = self.inner.clock.now_ms();
        let due: Vec<NodeId> = {
            let nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
            nodes
                .values()
                .filter(|n| {
                    n.state == NodeState::Idle
                        && n.auto_sleep_enabled
                        && n.idle_since.is_some_and(|since| now - since >= self.inner.config.idle_timeout_ms)
                })
                .map(|n| n.node_id.clone())
                .collect()
        };
        due.into_iter().filter(|id| self.sleep(id)).collect()
    }

    /// Starts a background task that calls `check_idle_nodes` every
    /// `interval_ms` milliseconds, until `stop_idle_check` is called.
    pub fn start_idle_check(&self, interval_ms: u64) {
        self.inner.idle_check_stop.store(false, Ordering::SeqCst);
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                if manager.inner.idle_check_stop.load(Ordering::SeqCst) {
                    return;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.check_idle_nodes();
                    }
                    _ = manager.inner.idle_check_notify.notified() => {
                        return;
                    }
                }
            }
        });
        let mut slot = self.inner.idle_check_task.lock().expect("idle check task lock poisoned");
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Stops the background task started by `start_idle_check`.
    pub fn stop_idle_check(&self) {
        self.inner.idle_check_stop.store(true, Ordering::SeqCst);
        self.inner.idle_check_notify.notify_waiters();
        if let Some(handle) = self.inner.idle_check_task.lock().expect("idle check task lock poisoned").take() {
            handle.abort();
        }
    }

    /// Sum of every node's accumulated savings, plus the in-progress sleep
    /// segment for any node currently `Sleeping` (not yet accounted for).
    pub fn get_total_savings(&self) -> i64 {
        let now = self.inner.clock.now_ms();
        let nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
        nodes
            .values()
            .map(|n| {
                let ongoing = if n.state == NodeState::Sleeping {
                    n.sleeping_since.map(|since| savings_for(now - since, n.cost_per_hour_cents)).unwrap_or(0)
                } else {
                    0
                };
                n.estimated_savings_cents + ongoing
            })
            .sum()
    }

    /// Returns a node's tracked state, if registered.
    pub fn get_node(&self, node_id: &NodeId) -> Option<IdleNodeEntry> {
        let nodes = self.inner.nodes.lock().expect("idle manager state poisoned");
        nodes.get(node_id).cloned()
    }

    fn emit(&self, node_id: NodeId, kind: IdleEventKind, timestamp: i64) {
        tracing::debug!(node = %node_id, ?kind, "idle manager event");
        let _ = self.inner.events.send(IdleEvent { node_id, kind, timestamp });
    }
}

fn accumulate_savings(node: &mut IdleNodeEntry, now: i64) {
    let Some(sleeping_since) = node.sleeping_since else { return };
    let delta = now - sleeping_since;
    node.total_sleep_time_ms += delta;
    node.estimated_savings_cents += savings_for(delta, node.cost_per_hour_cents);
}

fn savings_for(delta_ms: i64, cost_per_hour_cents: i64) -> i64 {
    ((delta_ms as f64 / MS_PER_HOUR) * cost_per_hour_cents as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use cp_types::ManualClock;

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    #[test]
    fn new_rejects_non_positive_idle_timeout() {
        let err = IdleManager::new(
            IdleManagerConfig {
                idle_timeout_ms: 0,
                ..IdleManagerConfig::default()
            },
            Arc::new(ManualClock::new(0)),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotPositive {
                field: "idle_timeout_ms",
                value: 0
            }
        );
    }

    #[test]
    fn lifecycle_rejects_transitions_from_wrong_states() {
        let manager = IdleManager::new(IdleManagerConfig::default(), Arc::new(ManualClock::new(0)))
            .expect("valid default config");
        let n = node("n");
        manager.register_node(n.clone(), Some(600), true);

        assert!(!manager.sleep(&n));
        assert!(manager.mark_idle(&n));
        assert!(!manager.mark_idle(&n));
        assert!(manager.sleep(&n));
        assert!(!manager.mark_idle(&n));
    }

    /// Scenario S5 (spec §8): register n (`costPerHourCents=600`), mark it
    /// idle at t=0, auto-check at t=400s with `idleTimeoutMs=300000` sleeps
    /// it; `wake` at t=400+30s fails (below the 60s floor); `wake` at
    /// t=400+120s succeeds, accumulating
    /// `round((120000/3600000) * 600) = 20` cents.
    #[tokio::test]
    async fn scenario_s5_idle_sleep_cycle() {
        let clock = Arc::new(ManualClock::new(0));
        let manager = IdleManager::new(IdleManagerConfig::default(), clock.clone()).expect("valid default config");
        let n = node("n");
        manager.register_node(n.clone(), Some(600), true);

        manager.mark_idle(&n);
        clock.set_ms(400_000);
        let slept = manager.check_idle_nodes();
        assert_eq!(slept, vec![n.clone()]);
        assert_eq!(manager.get_node(&n).unwrap().state, NodeState::Sleeping);

        clock.set_ms(400_000 + 30_000);
        assert!(!manager.wake(&n));
        assert_eq!(manager.get_node(&n).unwrap().state, NodeState::Sleeping);

        clock.set_ms(400_000 + 120_000);
        assert!(manager.wake(&n));
        assert_eq!(manager.get_node(&n).unwrap().state, NodeState::Waking);
        assert_eq!(manager.get_node(&n).unwrap().estimated_savings_cents, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn waking_completes_to_active_after_wake_up_time() {
        let clock = Arc::new(ManualClock::new(0));
        let manager = IdleManager::new(
            IdleManagerConfig {
                wake_up_time_ms: 30_000,
                ..IdleManagerConfig::default()
            },
            clock.clone(),
        )
        .expect("valid config");
        let n = node("n");
        manager.register_node(n.clone(), Some(600), true);
        manager.mark_idle(&n);
        manager.sleep(&n);
        clock.set_ms(100_000);

        assert!(manager.wake(&n));
        tokio::time::advance(std::time::Duration::from_millis(30_001)).await;
        tokio::task::yield_now().await;

        assert_eq!(manager.get_node(&n).unwrap().state, NodeState::Active);
    }

    #[test]
    fn savings_are_monotone_across_sleep_segments() {
        let clock = Arc::new(ManualClock::new(0));
        let manager = IdleManager::new(IdleManagerConfig::default(), clock.clone()).expect("valid default config");
        let n = node("n");
        manager.register_node(n.clone(), Some(3600), true);

        manager.mark_idle(&n);
        manager.sleep(&n);
        clock.set_ms(3_600_000);
        manager.mark_active(&n);
        let after_first = manager.get_node(&n).unwrap().estimated_savings_cents;
        assert_eq!(after_first, 3600);

        manager.mark_idle(&n);
        manager.sleep(&n);
        clock.set_ms(3_600_000 + 3_600_000);
        manager.mark_active(&n);
        let after_second = manager.get_node(&n).unwrap().estimated_savings_cents;
        assert!(after_second >= after_first);
    }

    #[test]
    fn get_total_savings_includes_ongoing_sleep_segment() {
        let clock = Arc::new(ManualClock::new(0));
        let manager = IdleManager::new(IdleManagerConfig::default(), clock.clone()).expect("valid default config");
        let n = node("n");
        manager.register_node(n.clone(), Some(3600), true);
        manager.mark_idle(&n);
        manager.sleep(&n);

        clock.set_ms(1_800_000);
        assert_eq!(manager.get_total_savings(), 1800);
    }

    proptest::proptest! {
        /// Spec §4.5: accumulated savings never decrease across an
        /// arbitrary sequence of idle/sleep/wake segments, each long enough
        /// to clear `min_sleep_duration_ms`.
        #[test]
        fn savings_are_monotone_over_arbitrary_segments(segment_minutes in proptest::collection::vec(1i64..=120, 1..20)) {
            let clock = Arc::new(ManualClock::new(0));
            let manager = IdleManager::new(IdleManagerConfig::default(), clock.clone()).expect("valid default config");
            let n = node("n");
            manager.register_node(n.clone(), Some(3600), true);

            let mut now = 0i64;
            let mut previous = 0i64;
            for minutes in segment_minutes {
                manager.mark_idle(&n);
                manager.sleep(&n);
                now += minutes * 60_000;
                clock.set_ms(now);
                manager.mark_active(&n);

                let current = manager.get_node(&n).unwrap().estimated_savings_cents;
                proptest::prop_assert!(current >= previous);
                previous = current;
            }
        }
    }
}
