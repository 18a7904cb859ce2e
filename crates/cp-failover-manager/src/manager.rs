use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use cp_types::{Clock, ConfigError, RegionId};
use tokio::sync::broadcast;

use crate::event::{FailoverEvent, HealthCheckResult};
use crate::region::{FailoverState, RegionFailoverConfig, RegionFailoverState};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Tunables for [`FailoverManager`] that apply across all regions.
#[derive(Debug, Clone, Copy)]
pub struct FailoverManagerConfig {
    /// Cap on the number of events retained per region.
    pub max_event_history: usize,
}

impl Default for FailoverManagerConfig {
    fn default() -> Self {
        Self { max_event_history: 1000 }
    }
}

struct State {
    regions: HashMap<RegionId, RegionFailoverState>,
    events: HashMap<RegionId, VecDeque<FailoverEvent>>,
}

struct Inner {
    config: FailoverManagerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    events_tx: broadcast::Sender<FailoverEvent>,
}

/// Converts per-region health checks into routing decisions with
/// hysteresis and a failback floor (spec §4.4).
#[derive(Clone)]
pub struct FailoverManager {
    inner: Arc<Inner>,
}

impl FailoverManager {
    /// Builds an empty failover manager.
    ///
    /// Refuses a non-positive `max_event_history` (spec §7 "Configuration
    /// error").
    pub fn new(config: FailoverManagerConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        ConfigError::require_positive("max_event_history", config.max_event_history as i64)?;
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                clock,
                state: Mutex::new(State {
                    regions: HashMap::new(),
                    events: HashMap::new(),
                }),
                events_tx,
            }),
        })
    }

    /// Subscribes to `failover:event` transitions across all regions.
    pub fn subscribe(&self) -> broadcast::Receiver<FailoverEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Registers a region with `state = Normal` and zeroed counters.
    ///
    /// Refuses a non-positive `failure_threshold`, `recovery_threshold`, or
    /// `failback_delay_ms` (spec §7 "Configuration error").
    pub fn register_region(&self, config: RegionFailoverConfig) -> Result<(), ConfigError> {
        ConfigError::require_positive("failure_threshold", config.failure_threshold as i64)?;
        ConfigError::require_positive("recovery_threshold", config.recovery_threshold as i64)?;
        ConfigError::require_positive("failback_delay_ms", config.failback_delay_ms as i64)?;

        let mut state = self.inner.state.lock().expect("failover manager state poisoned");
        let region_id = config.region_id.clone();
        state.regions.insert(region_id.clone(), RegionFailoverState::new(config));
        state.events.entry(region_id).or_default();
        Ok(())
    }

    /// Feeds one health-check result through a region's state machine.
    ///
    /// Returns `false` without mutating state if `result.region_id` was
    /// never registered.
    pub fn process_health_check(&self, result: HealthCheckResult) -> bool {
        let mut guard = self.inner.state.lock().expect("failover manager state poisoned");
        let State { regions, events } = &mut *guard;
        let Some(region) = regions.get_mut(&result.region_id) else {
            return false;
        };
        let log = events.entry(result.region_id.clone()).or_default();

        region.last_check_at = Some(result.timestamp);

        if result.healthy {
            region.consecutive_failures = 0;
            region.consecutive_successes += 1;

            if region.state == FailoverState::FailedOver {
                let failed_over_at = region.failed_over_at.unwrap_or(result.timestamp);
                let delay_elapsed = result.timestamp - failed_over_at >= region.config.failback_delay_ms as i64;
                let recovered_enough = region.consecutive_successes >= region.config.recovery_threshold;
                if delay_elapsed && recovered_enough {
                    self.transition_failback(region, log, result.timestamp, None);
                }
            } else if region.state == FailoverState::Degraded {
                region.state = FailoverState::Normal;
                push_event(
                    log,
                    self.inner.config.max_event_history,
                    &self.inner.events_tx,
                    FailoverEvent {
                        from_region: region.config.region_id.clone(),
                        to_region: region.config.region_id.clone(),
                        state: FailoverState::Normal,
                        reason: Some("recovered from degraded".to_string()),
                        timestamp: result.timestamp,
                    },
                );
            }
        } else {
            region.consecutive_successes = 0;
            region.consecutive_failures += 1;

            let degraded_threshold = region.config.failure_threshold.div_ceil(2);
            if region.state == FailoverState::Normal && region.consecutive_failures >= degraded_threshold {
                region.state = FailoverState::Degraded;
                push_event(
                    log,
                    self.inner.config.max_event_history,
                    &self.inner.events_tx,
                    FailoverEvent {
                        from_region: region.config.region_id.clone(),
                        to_region: region.config.region_id.clone(),
                        state: FailoverState::Degraded,
                        reason: Some(format!(
                            "{} consecutive failures",
                            region.consecutive_failures
                        )),
                        timestamp: result.timestamp,
                    },
                );
            }

            if region.consecutive_failures >= region.config.failure_threshold
                && !matches!(region.state, FailoverState::FailingOver | FailoverState::FailedOver)
            {
                self.transition_failover(region, log, result.timestamp, None);
            }
        }
        true
    }

    /// Manually transitions a region to `FailedOver`, bypassing counters.
    ///
    /// Returns `false` without mutating state if `region_id` was never
    /// registered.
    pub fn force_failover(&self, region_id: &RegionId, reason: Option<String>) -> bool {
        let mut guard = self.inner.state.lock().expect("failover manager state poisoned");
        let State { regions, events } = &mut *guard;
        let Some(region) = regions.get_mut(region_id) else {
            return false;
        };
        let log = events.entry(region_id.clone()).or_default();
        let now = self.inner.clock.now_ms();
        self.transition_failover(region, log, now, reason);
        true
    }

    /// Manually transitions a region back to `Normal`, bypassing counters.
    ///
    /// Returns `false` without mutating state if `region_id` was never
    /// registered.
    pub fn force_failback(&self, region_id: &RegionId) -> bool {
        let mut guard = self.inner.state.lock().expect("failover manager state poisoned");
        let State { regions, events } = &mut *guard;
        let Some(region) = regions.get_mut(region_id) else {
            return false;
        };
        let log = events.entry(region_id.clone()).or_default();
        let now = self.inner.clock.now_ms();
        self.transition_failback(region, log, now, None);
        true
    }

    /// Returns the region currently serving traffic for `region_id`: the
    /// backup while `FailedOver`, otherwise `region_id` itself.
    pub fn get_active_region(&self, region_id: &RegionId) -> Option<RegionId> {
        let state = self.inner.state.lock().expect("failover manager state poisoned");
        state.regions.get(region_id).map(|region| {
            if region.state == FailoverState::FailedOver {
                region.config.backup_region_id.clone()
            } else {
                region_id.clone()
            }
        })
    }

    /// Returns a region's current state, if registered.
    pub fn get_state(&self, region_id: &RegionId) -> Option<FailoverState> {
        let state = self.inner.state.lock().expect("failover manager state poisoned");
        state.regions.get(region_id).map(|r| r.state)
    }

    /// Returns a full snapshot of a region's tracked state.
    pub fn get_region(&self, region_id: &RegionId) -> Option<RegionFailoverState> {
        let state = self.inner.state.lock().expect("failover manager state poisoned");
        state.regions.get(region_id).cloned()
    }

    /// Returns every region currently routed to its backup.
    pub fn get_failed_over_regions(&self) -> Vec<RegionId> {
        let state = self.inner.state.lock().expect("failover manager state poisoned");
        state
            .regions
            .iter()
            .filter(|(_, r)| r.state == FailoverState::FailedOver)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Returns up to `limit` most recent events for a region, oldest first.
    pub fn get_events(&self, region_id: &RegionId, limit: Option<usize>) -> Vec<FailoverEvent> {
        let state = self.inner.state.lock().expect("failover manager state poisoned");
        let Some(log) = state.events.get(region_id) else {
            return Vec::new();
        };
        match limit {
            Some(limit) if limit < log.len() => log.iter().skip(log.len() - limit).cloned().collect(),
            _ => log.iter().cloned().collect(),
        }
    }

    fn transition_failover(
        &self,
        region: &mut RegionFailoverState,
        log: &mut VecDeque<FailoverEvent>,
        timestamp: i64,
        reason: Option<String>,
    ) {
        let primary = region.config.region_id.clone();
        let backup = region.config.backup_region_id.clone();

        push_event(
            log,
            self.inner.config.max_event_history,
            &self.inner.events_tx,
            FailoverEvent {
                from_region: primary.clone(),
                to_region: primary.clone(),
                state: FailoverState::FailingOver,
                reason: reason.clone(),
                timestamp,
            },
        );

        region.state = FailoverState::FailedOver;
        region.failed_over_at = Some(timestamp);

        push_event(
            log,
            self.inner.config.max_event_history,
            &self.inner.events_tx,
            FailoverEvent {
                from_region: primary,
                to_region: backup,
                state: FailoverState::FailedOver,
                reason,
                timestamp,
            },
        );
    }

    fn transition_failback(
        &self,
        region: &mut RegionFailoverState,
        log: &mut VecDeque<FailoverEvent>,
        timestamp: i64,
        reason: Option<String>,
    ) {
        let primary = region.config.region_id.clone();
        let backup = region.config.backup_region_id.clone();

        push_event(
            log,
            self.inner.config.max_event_history,
            &self.inner.events_tx,
            FailoverEvent {
                from_region: backup.clone(),
                to_region: primary.clone(),
                state: FailoverState::FailingBack,
                reason: reason.clone(),
                timestamp,
            },
        );

        region.state = FailoverState::Normal;
        region.failed_over_at = None;
        region.consecutive_successes = 0;

        push_event(
            log,
            self.inner.config.max_event_history,
            &self.inner.events_tx,
            FailoverEvent {
                from_region: backup,
                to_region: primary,
                state: FailoverState::Normal,
                reason,
                timestamp,
            },
        );
    }
}

fn push_event(
    log: &mut VecDeque<FailoverEvent>,
    max_event_history: usize,
    tx: &broadcast::Sender<FailoverEvent>,
    event: FailoverEvent,
) {
    if log.len() >= max_event_history {
        log.pop_front();
    }
    tracing::debug!(region = %event.from_region, state = ?event.state, "failover event");
    let _ = tx.send(event.clone());
    log.push_back(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cp_types::ManualClock;

    fn config(region_id: &str, backup_id: &str) -> RegionFailoverConfig {
        RegionFailoverConfig {
            region_id: RegionId::from(region_id),
            backup_region_id: RegionId::from(backup_id),
            failure_threshold: 3,
            check_interval_ms: 1000,
            failback_delay_ms: 60_000,
            recovery_threshold: 2,
        }
    }

    fn check(region_id: &str, healthy: bool, timestamp_ms: i64) -> HealthCheckResult {
        HealthCheckResult {
            region_id: RegionId::from(region_id),
            healthy,
            timestamp: timestamp_ms,
            response_time_ms: 0,
            healthy_nodes: if healthy { 1 } else { 0 },
            total_nodes: 1,
            message: None,
        }
    }

    fn manager_with_region(clock: Arc<ManualClock>) -> FailoverManager {
        let manager = FailoverManager::new(FailoverManagerConfig::default(), clock).expect("valid default config");
        manager.register_region(config("r1", "r2")).expect("valid region config");
        manager
    }

    #[test]
    fn new_rejects_non_positive_max_event_history() {
        let err = FailoverManager::new(
            FailoverManagerConfig { max_event_history: 0 },
            Arc::new(ManualClock::new(0)),
        )
        .unwrap_err();
        assert_eq!(
            err,
            cp_types::ConfigError::NotPositive { field: "max_event_history", value: 0 }
        );
    }

    #[test]
    fn register_region_rejects_non_positive_failure_threshold() {
        let manager = FailoverManager::new(FailoverManagerConfig::default(), Arc::new(ManualClock::new(0)))
            .expect("valid default config");
        let mut bad = config("r1", "r2");
        bad.failure_threshold = 0;
        assert!(manager.register_region(bad).is_err());
    }

    #[test]
    fn unregistered_region_operations_return_false_without_panicking() {
        let manager = FailoverManager::new(FailoverManagerConfig::default(), Arc::new(ManualClock::new(0)))
            .expect("valid default config");
        let missing = RegionId::from("nope");

        assert!(!manager.process_health_check(check("nope", true, 0)));
        assert!(!manager.force_failover(&missing, None));
        assert!(!manager.force_failback(&missing));
        assert!(manager.get_state(&missing).is_none());
    }

    #[test]
    fn degraded_threshold_is_half_of_failure_threshold() {
        let manager = manager_with_region(Arc::new(ManualClock::new(0)));

        manager.process_health_check(check("r1", false, 1000));
        assert_eq!(manager.get_state(&RegionId::from("r1")), Some(FailoverState::Normal));
        manager.process_health_check(check("r1", false, 2000));
        assert_eq!(manager.get_state(&RegionId::from("r1")), Some(FailoverState::Degraded));
    }

    /// Scenario S1 (spec §8): register r1/r2 with `failureThreshold=3`,
    /// `failbackDelayMs=60000`, `recoveryThreshold=2`. Three unhealthy
    /// checks at t=1,2,3s fail r1 over; a healthy check at t=10s and again
    /// at t=62s stay `FailedOver` (delay floor / recovery streak not yet
    /// both satisfied); a healthy check at t=63s returns to `Normal` with
    /// exactly two new events appended for that transition.
    #[test]
    fn scenario_s1_failover_then_failback() {
        let manager = manager_with_region(Arc::new(ManualClock::new(0)));
        let r1 = RegionId::from("r1");

        manager.process_health_check(check("r1", false, 1_000));
        manager.process_health_check(check("r1", false, 2_000));
        manager.process_health_check(check("r1", false, 3_000));

        assert_eq!(manager.get_state(&r1), Some(FailoverState::FailedOver));
        assert_eq!(manager.get_active_region(&r1), Some(RegionId::from("r2")));

        manager.process_health_check(check("r1", true, 10_000));
        assert_eq!(manager.get_state(&r1), Some(FailoverState::FailedOver));

        manager.process_health_check(check("r1", true, 62_000));
        assert_eq!(manager.get_state(&r1), Some(FailoverState::FailedOver));

        let events_before = manager.get_events(&r1, None).len();
        manager.process_health_check(check("r1", true, 63_000));
        assert_eq!(manager.get_state(&r1), Some(FailoverState::Normal));
        assert_eq!(manager.get_active_region(&r1), Some(r1.clone()));

        let events_after = manager.get_events(&r1, None).len();
        assert_eq!(events_after - events_before, 2);
    }

    #[test]
    fn force_failover_and_failback_bypass_counters() {
        let manager = manager_with_region(Arc::new(ManualClock::new(5_000)));
        let r1 = RegionId::from("r1");

        manager.force_failover(&r1, Some("manual drill".to_string()));
        assert_eq!(manager.get_state(&r1), Some(FailoverState::FailedOver));

        manager.force_failback(&r1);
        assert_eq!(manager.get_state(&r1), Some(FailoverState::Normal));
    }

    #[test]
    fn event_history_is_capped_with_oldest_eviction() {
        let manager = FailoverManager::new(
            FailoverManagerConfig { max_event_history: 2 },
            Arc::new(ManualClock::new(0)),
        )
        .expect("valid config");
        let r1 = RegionId::from("r1");
        manager.register_region(config("r1", "r2")).expect("valid region config");

        manager.force_failover(&r1, None);
        manager.force_failback(&r1);
        manager.force_failover(&r1, None);

        let events = manager.get_events(&r1, None);
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn subscribers_observe_composite_failover_events() {
        let manager = manager_with_region(Arc::new(ManualClock::new(0)));
        let r1 = RegionId::from("r1");
        let mut rx = manager.subscribe();

        manager.process_health_check(check("r1", false, 1_000));
        manager.process_health_check(check("r1", false, 2_000));
        manager.process_health_check(check("r1", false, 3_000));

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event.state);
        }
        assert!(seen.contains(&FailoverState::Degraded));
        assert!(seen.contains(&FailoverState::FailingOver));
        assert!(seen.contains(&FailoverState::FailedOver));
    }
}
