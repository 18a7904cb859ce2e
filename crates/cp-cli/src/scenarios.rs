//! Narrated replays of the literal scenarios in spec §8 (S1-S6), driven by a
//! [`ManualClock`] instead of wall-clock sleeps so the whole walkthrough
//! completes instantly.

use std::collections::BTreeMap;
use std::sync::Arc;

use cp_artifact_store::{ArtifactStore, ArtifactStoreConfig};
use cp_failover_manager::{FailoverManager, FailoverManagerConfig, HealthCheckResult, RegionFailoverConfig};
use cp_idle_manager::{IdleManager, IdleManagerConfig};
use cp_job_tracker::{JobTracker, JobTrackerConfig, ResourceUsage};
use cp_quota_manager::{EntityType, QuotaDefinition, QuotaManager, QuotaUsageSnapshot, ResourceType};
use cp_types::{Clock, EntityId, JobId, ManualClock, NodeId, RandomIdGenerator, RegionId};

use crate::cli::ScenarioName;

pub fn run(name: ScenarioName) -> anyhow::Result<()> {
    match name {
        ScenarioName::S1 => s1_failover_then_failback(),
        ScenarioName::S2 => s2_artifact_eviction(),
        ScenarioName::S3 => s3_quota_hard_limit(),
        ScenarioName::S4 => s4_quota_daily_roll(),
        ScenarioName::S5 => s5_idle_sleep_cycle(),
        ScenarioName::S6 => s6_job_lifecycle(),
        ScenarioName::All => {
            s1_failover_then_failback()?;
            s2_artifact_eviction()?;
            s3_quota_hard_limit()?;
            s4_quota_daily_roll()?;
            s5_idle_sleep_cycle()?;
            s6_job_lifecycle()
        }
    }
}

fn s1_failover_then_failback() -> anyhow::Result<()> {
    println!("== S1: failover then failback ==");
    let clock = Arc::new(ManualClock::new(0));
    let mgr = FailoverManager::new(FailoverManagerConfig::default(), clock.clone())?;
    let r1 = RegionId::from("r1");
    let r2 = RegionId::from("r2");

    mgr.register_region(RegionFailoverConfig {
        region_id: r1.clone(),
        backup_region_id: r2.clone(),
        failure_threshold: 3,
        check_interval_ms: 1000,
        failback_delay_ms: 60_000,
        recovery_threshold: 2,
    })?;

    for t in [1_000, 2_000, 3_000] {
        clock.set_ms(t);
        mgr.process_health_check(HealthCheckResult {
            region_id: r1.clone(),
            healthy: false,
            timestamp: t,
            response_time_ms: 0,
            healthy_nodes: 0,
            total_nodes: 1,
            message: None,
        });
    }
    println!(
        "  after 3 unhealthy checks: state={:?} active_region={:?}",
        mgr.get_state(&r1),
        mgr.get_active_region(&r1)
    );

    for t in [10_000, 62_000, 63_000] {
        clock.set_ms(t);
        mgr.process_health_check(HealthCheckResult {
            region_id: r1.clone(),
            healthy: true,
            timestamp: t,
            response_time_ms: 0,
            healthy_nodes: 1,
            total_nodes: 1,
            message: None,
        });
        println!(
            "  t={t}ms healthy: state={:?} active_region={:?}",
            mgr.get_state(&r1),
            mgr.get_active_region(&r1)
        );
    }
    println!("  event log size: {}", mgr.get_events(&r1, None).len());
    Ok(())
}

fn s2_artifact_eviction() -> anyhow::Result<()> {
    println!("== S2: artifact eviction ==");
    let clock = Arc::new(ManualClock::new(0));
    let store = ArtifactStore::new(
        ArtifactStoreConfig { max_total_size_bytes: 1000, ..ArtifactStoreConfig::default() },
        clock.clone(),
        Arc::new(RandomIdGenerator),
    )?;
    let job = JobId::from("job-s2");

    for (label, t) in [("A", 1), ("B", 2), ("C", 3)] {
        clock.set_ms(t);
        let content = vec![0u8; 400];
        let meta = store.store(job.clone(), format!("artifact-{label}"), content, None, BTreeMap::new());
        println!("  stored {label} at t={t}ms -> {:?}", meta.map(|m| m.artifact_id));
    }

    let stats = store.get_stats();
    println!(
        "  final stats: total_artifacts={} total_size_bytes={}",
        stats.total_artifacts, stats.total_size_bytes
    );
    Ok(())
}

fn s3_quota_hard_limit() -> anyhow::Result<()> {
    println!("== S3: quota hard limit ==");
    let clock = Arc::new(ManualClock::new(0));
    let qm = QuotaManager::new(clock.clone());
    let entity = EntityId::from("u");

    qm.set_quota(QuotaDefinition {
        quota_id: "q1".to_string(),
        entity_id: entity.clone(),
        entity_type: EntityType::User,
        max_cpu_minutes: u64::MAX,
        max_ram_mb: u64::MAX,
        max_storage_mb: u64::MAX,
        max_concurrent_jobs: 2,
        max_builds_per_day: u32::MAX,
        warning_threshold_percent: 80,
        hard_limit: true,
    });
    qm.update_usage(QuotaUsageSnapshot {
        entity_id: entity.clone(),
        cpu_minutes_used: 0,
        ram_mb_used: 0,
        storage_mb_used: 0,
        concurrent_jobs: 2,
        builds_today: 0,
        daily_reset_date: clock.today(),
    });

    let result = qm.check_quota(&entity, ResourceType::ConcurrentJobs, 1);
    println!(
        "  checkQuota(concurrent-jobs, +1): allowed={} current_usage={} limit={:?} usage_percent={}",
        result.allowed, result.current_usage, result.limit, result.usage_percent
    );
    Ok(())
}

fn s4_quota_daily_roll() -> anyhow::Result<()> {
    println!("== S4: quota daily roll ==");
    let jan1 = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date");
    let jan2 = chrono::NaiveDate::from_ymd_opt(2025, 1, 2).expect("valid date");
    let jan2_ms = jan2.and_hms_opt(0, 0, 0).expect("valid time").and_utc().timestamp_millis();

    let clock = Arc::new(ManualClock::new(jan2_ms));
    let qm = QuotaManager::new(clock.clone());
    let entity = EntityId::from("u");

    qm.set_quota(QuotaDefinition {
        quota_id: "q1".to_string(),
        entity_id: entity.clone(),
        entity_type: EntityType::User,
        max_cpu_minutes: u64::MAX,
        max_ram_mb: u64::MAX,
        max_storage_mb: u64::MAX,
        max_concurrent_jobs: u32::MAX,
        max_builds_per_day: 5,
        warning_threshold_percent: 80,
        hard_limit: true,
    });
    qm.update_usage(QuotaUsageSnapshot {
        entity_id: entity.clone(),
        cpu_minutes_used: 0,
        ram_mb_used: 0,
        storage_mb_used: 0,
        concurrent_jobs: 0,
        builds_today: 10,
        daily_reset_date: jan1,
    });

    let incremented = qm.increment_builds(&entity);
    println!("  incrementBuilds after day rollover -> {incremented}");
    let result = qm.check_quota(&entity, ResourceType::Builds, 0);
    println!("  checkQuota(builds, +0): current_usage={} allowed={}", result.current_usage, result.allowed);
    Ok(())
}

fn s5_idle_sleep_cycle() -> anyhow::Result<()> {
    println!("== S5: idle sleep cycle ==");
    let clock = Arc::new(ManualClock::new(0));
    let im = IdleManager::new(IdleManagerConfig::default(), clock.clone())?;
    let node = NodeId::from("n");

    im.register_node(node.clone(), Some(600), true);
    im.mark_idle(&node);

    clock.set_ms(400_000);
    let slept = im.check_idle_nodes();
    println!("  auto-sleep at t=400_000ms -> slept {:?}", slept);

    clock.set_ms(430_000);
    println!("  wake at t=430_000ms (30s asleep) -> {}", im.wake(&node));

    clock.set_ms(520_000);
    println!("  wake at t=520_000ms (120s asleep) -> {}", im.wake(&node));

    println!("  total savings (cents): {}", im.get_total_savings());
    Ok(())
}

fn s6_job_lifecycle() -> anyhow::Result<()> {
    println!("== S6: job lifecycle ==");
    let clock = Arc::new(ManualClock::new(0));
    let tracker = JobTracker::new(JobTrackerConfig::default(), clock.clone());
    let mut notifications = tracker.subscribe();
    let job_id = JobId::from("j");

    tracker.track(job_id.clone(), "build", None, BTreeMap::new())?;
    clock.set_ms(1_000);
    tracker.mark_started(&job_id, NodeId::from("node1"));
    for progress in [25, 50, 75] {
        tracker.update_progress(&job_id, progress);
    }
    clock.set_ms(4_000);
    tracker.mark_completed(&job_id, Some("ok".to_string()), Some(ResourceUsage::default()));

    println!("  getJob after completion: {:?}", tracker.get_job(&job_id));
    let history = tracker.get_history(Some(1));
    let archived = history.first().expect("archived job present").job();
    println!(
        "  archived: status={:?} progress={} duration_ms={:?} output_size_bytes={}",
        archived.status, archived.progress, archived.duration_ms, archived.resource_usage.output_size_bytes
    );

    print!("  notifications in order:");
    while let Ok(note) = notifications.try_recv() {
        print!(" {:?}", note.event);
    }
    println!();
    Ok(())
}
