use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use cp_types::{Clock, EntityId};
use tokio::sync::broadcast;

use crate::quota::{
    QuotaCheckResult, QuotaDefinition, QuotaEvent, QuotaEventKind, QuotaUsageSnapshot, ResourceType,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct State {
    quotas: HashMap<EntityId, QuotaDefinition>,
    usage: HashMap<EntityId, QuotaUsageSnapshot>,
}

struct Inner {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    events: broadcast::Sender<QuotaEvent>,
}

/// Per-entity admission control over CPU/RAM/storage/concurrency/build
/// quotas (spec §4.3).
#[derive(Clone)]
pub struct QuotaManager {
    inner: Arc<Inner>,
}

impl QuotaManager {
    /// Builds an empty quota manager.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                clock,
                state: Mutex::new(State {
                    quotas: HashMap::new(),
                    usage: HashMap::new(),
                }),
                events,
            }),
        }
    }

    /// Subscribes to `quota:warning` / `quota:exceeded` events.
    pub fn subscribe(&self) -> broadcast::Receiver<QuotaEvent> {
        self.inner.events.subscribe()
    }

    /// Registers or replaces the quota definition for an entity.
    pub fn set_quota(&self, def: QuotaDefinition) {
        let mut state = self.inner.state.lock().expect("quota manager state poisoned");
        state.quotas.insert(def.entity_id.clone(), def);
    }

    /// Removes an entity's quota definition. Returns `false` if none existed.
    pub fn remove_quota(&self, entity_id: &EntityId) -> bool {
        let mut state = self.inner.state.lock().expect("quota manager state poisoned");
        state.quotas.remove(entity_id).is_some()
    }

    /// Returns the current quota definition for an entity, if any.
    pub fn get_quota(&self, entity_id: &EntityId) -> Option<QuotaDefinition> {
        let state = self.inner.state.lock().expect("quota manager state poisoned");
        state.quotas.get(entity_id).cloned()
    }

    /// Replaces the stored usage snapshot for `snapshot.entity_id`, rolling
    /// `builds_today` over to 0 first if the previously stored snapshot's
    /// `daily_reset_date` predates the incoming one. Evaluates every
    /// resource dimension afterwards and emits a `QuotaEvent` for each one
    /// that is in warning or exceeded.
    pub fn update_usage(&self, mut snapshot: QuotaUsageSnapshot) {
        let entity_id = snapshot.entity_id.clone();

        let mut state = self.inner.state.lock().expect("quota manager state poisoned");
        if let Some(stored) = state.usage.get(&entity_id) {
            if stored.daily_reset_date < snapshot.daily_reset_date {
                snapshot.builds_today = 0;
            }
        }
        state.usage.insert(entity_id.clone(), snapshot);

        let quota = state.quotas.get(&entity_id).cloned();
        let usage = state.usage.get(&entity_id).cloned();

        for resource_type in [
            ResourceType::Cpu,
            ResourceType::Ram,
            ResourceType::Storage,
            ResourceType::ConcurrentJobs,
            ResourceType::Builds,
        ] {
            let result = check_quota_with(quota.as_ref(), usage.as_ref(), resource_type, 0);
            self.emit_if_notable(result);
        }
    }

    /// Evaluates whether drawing `additional_usage` more of `resource_type`
    /// is admissible for `entity_id` (spec §4.3 decision table).
    pub fn check_quota(
        &self,
        entity_id: &EntityId,
        resource_type: ResourceType,
        additional_usage: u64,
    ) -> QuotaCheckResult {
        let state = self.inner.state.lock().expect("quota manager state poisoned");
        let quota = state.quotas.get(entity_id).cloned();
        let usage = state.usage.get(entity_id).cloned();
        drop(state);
        check_quota_with(quota.as_ref(), usage.as_ref(), resource_type, additional_usage)
    }

    /// Increments `buildsToday` for `entity_id`, rolling it over to 0 first
    /// if the UTC date has advanced since the stored snapshot's
    /// `daily_reset_date`. Returns the post-increment count.
    pub fn increment_builds(&self, entity_id: &EntityId) -> u32 {
        let today = self.inner.clock.today();
        let mut state = self.inner.state.lock().expect("quota manager state poisoned");

        let snapshot = state
            .usage
            .entry(entity_id.clone())
            .or_insert_with(|| empty_snapshot(entity_id.clone(), today));

        if snapshot.daily_reset_date < today {
            snapshot.daily_reset_date = today;
            snapshot.builds_today = 0;
        }
        snapshot.builds_today += 1;
        snapshot.builds_today
    }

    fn emit_if_notable(&self, result: QuotaCheckResult) {
        let kind = if !result.allowed {
            QuotaEventKind::Exceeded
        } else if result.warning {
            QuotaEventKind::Warning
        } else {
            return;
        };
        tracing::debug!(entity = ?result.quota_id, ?kind, "quota event");
        let _ = self.inner.events.send(QuotaEvent { kind, result });
    }
}

fn empty_snapshot(entity_id: EntityId, today: NaiveDate) -> QuotaUsageSnapshot {
    QuotaUsageSnapshot {
        entity_id,
        cpu_minutes_used: 0,
        ram_mb_used: 0,
        storage_mb_used: 0,
        concurrent_jobs: 0,
        builds_today: 0,
        daily_reset_date: today,
    }
}

fn check_quota_with(
    quota: Option<&QuotaDefinition>,
    usage: Option<&QuotaUsageSnapshot>,
    resource_type: ResourceType,
    additional_usage: u64,
) -> QuotaCheckResult {
    let Some(quota) = quota else {
        let current = current_usage(usage, resource_type) + additional_usage;
        return QuotaCheckResult {
            allowed: true,
            quota_id: None,
            resource_type,
            current_usage: current,
            limit: None,
            usage_percent: 0,
            warning: false,
            message: "no quota defined".to_string(),
        };
    };

    let limit = limit_for(quota, resource_type);
    let projected = current_usage(usage, resource_type) + additional_usage;
    let usage_percent = if limit == 0 {
        100
    } else {
        ((projected as f64 / limit as f64) * 100.0).round() as u64
    };
    let warning = usage_percent >= quota.warning_threshold_percent as u64;

    let (allowed, message) = if projected <= limit {
        (true, "within quota".to_string())
    } else if !quota.hard_limit {
        (
            true,
            format!("soft limit exceeded: {projected} > {limit}, allowed because hardLimit=false"),
        )
    } else {
        (false, format!("hard limit exceeded: {projected} > {limit}"))
    };

    QuotaCheckResult {
        allowed,
        quota_id: Some(quota.quota_id.clone()),
        resource_type,
        current_usage: projected,
        limit: Some(limit),
        usage_percent,
        warning,
        message,
    }
}

fn current_usage(usage: Option<&QuotaUsageSnapshot>, resource_type: ResourceType) -> u64 {
    let Some(usage) = usage else { return 0 };
    match resource_type {
        ResourceType::Cpu => usage.cpu_minutes_used,
        ResourceType::Ram => usage.ram_mb_used,
        ResourceType::Storage => usage.storage_mb_used,
        ResourceType::ConcurrentJobs => usage.concurrent_jobs as u64,
        ResourceType::Builds => usage.builds_today as u64,
    }
}

fn limit_for(quota: &QuotaDefinition, resource_type: ResourceType) -> u64 {
    match resource_type {
        ResourceType::Cpu => quota.max_cpu_minutes,
        ResourceType::Ram => quota.max_ram_mb,
        ResourceType::Storage => quota.max_storage_mb,
        ResourceType::ConcurrentJobs => quota.max_concurrent_jobs as u64,
        ResourceType::Builds => quota.max_builds_per_day as u64,
    }
}
