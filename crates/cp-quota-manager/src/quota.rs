use chrono::NaiveDate;
use cp_types::EntityId;
use serde::{Deserialize, Serialize};

/// Kind of entity a quota is attached to (spec §3 `QuotaDefinition`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityType {
    /// An individual user account.
    User,
    /// An organization spanning multiple users.
    Org,
    /// A billing plan tier.
    Plan,
}

/// A resource dimension a quota can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceType {
    /// CPU minutes consumed.
    Cpu,
    /// RAM, in megabytes.
    Ram,
    /// Storage, in megabytes.
    Storage,
    /// Number of jobs running concurrently.
    ConcurrentJobs,
    /// Builds started since the last daily reset.
    Builds,
}

/// A quota definition for one entity (spec §3 `QuotaDefinition`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDefinition {
    /// Unique identifier for this quota.
    pub quota_id: String,
    /// Entity the quota applies to.
    pub entity_id: EntityId,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// CPU-minute cap.
    pub max_cpu_minutes: u64,
    /// RAM cap, in megabytes.
    pub max_ram_mb: u64,
    /// Storage cap, in megabytes.
    pub max_storage_mb: u64,
    /// Concurrent job cap.
    pub max_concurrent_jobs: u32,
    /// Daily build cap.
    pub max_builds_per_day: u32,
    /// Percentage of a limit at which a warning is raised, in `[0, 100]`.
    pub warning_threshold_percent: u8,
    /// Whether exceeding a limit blocks the request (`true`) or is merely
    /// reported (`false`).
    pub hard_limit: bool,
}

/// A point-in-time usage snapshot for one entity (spec §3
/// `QuotaUsageSnapshot`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsageSnapshot {
    /// Entity this snapshot describes.
    pub entity_id: EntityId,
    /// CPU minutes used.
    pub cpu_minutes_used: u64,
    /// RAM used, in megabytes.
    pub ram_mb_used: u64,
    /// Storage used, in megabytes.
    pub storage_mb_used: u64,
    /// Jobs currently running.
    pub concurrent_jobs: u32,
    /// Builds started since `daily_reset_date`.
    pub builds_today: u32,
    /// UTC date `builds_today` was last reset against.
    pub daily_reset_date: NaiveDate,
}

/// Result of a `checkQuota` admission check (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCheckResult {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// Quota backing this check, if one is defined for the entity.
    pub quota_id: Option<String>,
    /// Resource dimension checked.
    pub resource_type: ResourceType,
    /// `current + additional_usage`.
    pub current_usage: u64,
    /// The applicable limit, or `None` when no quota is defined (`+∞`).
    pub limit: Option<u64>,
    /// `round(100 * current_usage / limit)`, or `0` when `limit` is `None`.
    pub usage_percent: u64,
    /// Whether `usage_percent` has crossed the quota's warning threshold.
    pub warning: bool,
    /// Human-readable explanation of the decision.
    pub message: String,
}

/// Which side of the warning/exceeded boundary a `QuotaEvent` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaEventKind {
    /// Usage has crossed the warning threshold but not the hard limit.
    Warning,
    /// Usage has crossed the limit.
    Exceeded,
}

/// An emitted quota event, published on `quota:warning` / `quota:exceeded`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaEvent {
    /// Which boundary was crossed.
    pub kind: QuotaEventKind,
    /// The check result that triggered this event.
    pub result: QuotaCheckResult,
}
