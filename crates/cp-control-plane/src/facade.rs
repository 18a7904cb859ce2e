use std::collections::BTreeMap;
use std::sync::Arc;

use cp_artifact_store::{ArtifactMetadata, ArtifactStore};
use cp_failover_manager::FailoverManager;
use cp_idle_manager::IdleManager;
use cp_job_tracker::{Job, JobTracker, ResourceUsage, TrackError};
use cp_quota_manager::{QuotaCheckResult, QuotaManager, ResourceType};
use cp_types::{Clock, ConfigError, EntityId, IdGenerator, JobId};
use futures::stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::ControlPlaneConfig;
use crate::event::ControlPlaneEvent;

/// Why `ControlPlane::submit_job` rejected a submission.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    /// The entity's concurrent-job quota would be exceeded.
    #[error("quota exceeded: {0:?}")]
    QuotaExceeded(QuotaCheckResult),
    /// `job_id` is already tracked (active or archived).
    #[error("job already tracked")]
    DuplicateJob,
}

/// Owns one instance of each control-plane component and wires the
/// admission → tracking → artifact-persistence flow between them (spec §2
/// "Data flow").
#[derive(Clone)]
pub struct ControlPlane {
    /// Job lifecycle tracking.
    pub job_tracker: JobTracker,
    /// Bounded artifact storage.
    pub artifact_store: ArtifactStore,
    /// Per-entity admission control.
    pub quota: QuotaManager,
    /// Per-region failover state machines.
    pub failover: FailoverManager,
    /// Per-node idle/sleep lifecycle.
    pub idle: IdleManager,
}

impl ControlPlane {
    /// Builds a control plane with every component sharing one clock and
    /// id generator.
    ///
    /// Fails if any sub-component's configuration is invalid (spec §7
    /// "Configuration error").
    pub fn new(config: ControlPlaneConfig, clock: Arc<dyn Clock>, id_gen: Arc<dyn IdGenerator>) -> Result<Self, ConfigError> {
        Ok(Self {
            job_tracker: JobTracker::new(config.job_tracker, clock.clone()),
            artifact_store: ArtifactStore::new(config.artifact_store, clock.clone(), id_gen)?,
            quota: QuotaManager::new(clock.clone()),
            failover: FailoverManager::new(config.failover, clock.clone())?,
            idle: IdleManager::new(config.idle, clock)?,
        })
    }

    /// Checks the entity's concurrent-job quota and, if admitted, creates a
    /// tracked job. Rejects without mutating job state if the quota's hard
    /// limit would be exceeded or `job_id` is already tracked.
    pub fn submit_job(
        &self,
        entity_id: EntityId,
        job_id: JobId,
        job_type: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Job, SubmitError> {
        let check = self.quota.check_quota(&entity_id, ResourceType::ConcurrentJobs, 1);
        if !check.allowed {
            tracing::info!(entity = %entity_id, job_id = %job_id, "submission rejected by quota");
            return Err(SubmitError::QuotaExceeded(check));
        }

        self.job_tracker
            .track(job_id, job_type, Some(entity_id), metadata)
            .map_err(|TrackError::DuplicateJob| SubmitError::DuplicateJob)
    }

    /// Marks a job completed and persists its output as an artifact in one
    /// call, matching spec §2's "on completion writes outputs into
    /// ArtifactStore".
    pub fn complete_job(
        &self,
        job_id: JobId,
        output: Vec<u8>,
        resource_usage: ResourceUsage,
        artifact_name: impl Into<String>,
    ) -> (bool, Option<ArtifactMetadata>) {
        let summary = String::from_utf8_lossy(&output).into_owned();
        let marked = self
            .job_tracker
            .mark_completed(&job_id, Some(summary), Some(resource_usage));
        let artifact = self
            .artifact_store
            .store(job_id, artifact_name, output, None, BTreeMap::new());
        (marked, artifact)
    }

    /// Merges every component's event stream into one, matching spec §6
    /// `EventSink`'s combined topic list.
    pub fn subscribe_all(&self) -> impl futures::Stream<Item = ControlPlaneEvent> + Send + 'static {
        let job = BroadcastStream::new(self.job_tracker.subscribe())
            .filter_map(|r| async move { r.ok().map(ControlPlaneEvent::Job) })
            .boxed();
        let quota = BroadcastStream::new(self.quota.subscribe())
            .filter_map(|r| async move { r.ok().map(ControlPlaneEvent::Quota) })
            .boxed();
        let failover = BroadcastStream::new(self.failover.subscribe())
            .filter_map(|r| async move { r.ok().map(ControlPlaneEvent::Failover) })
            .boxed();
        let idle = BroadcastStream::new(self.idle.subscribe())
            .filter_map(|r| async move { r.ok().map(ControlPlaneEvent::Idle) })
            .boxed();

        futures::stream::select_all([job, quota, failover, idle])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cp_types::{ManualClock, RandomIdGenerator};

    fn control_plane() -> ControlPlane {
        ControlPlane::new(
            ControlPlaneConfig::default(),
            Arc::new(ManualClock::new(0)),
            Arc::new(RandomIdGenerator),
        )
        .expect("valid default config")
    }

    #[test]
    fn submit_job_is_admitted_without_a_quota() {
        let cp = control_plane();
        let job = cp
            .submit_job(EntityId::from("u"), JobId::from("j1"), "build", BTreeMap::new())
            .unwrap();
        assert_eq!(job.job_id, JobId::from("j1"));
    }

    #[test]
    fn submit_job_rejects_duplicate_ids() {
        let cp = control_plane();
        cp.submit_job(EntityId::from("u"), JobId::from("j1"), "build", BTreeMap::new())
            .unwrap();
        let err = cp
            .submit_job(EntityId::from("u"), JobId::from("j1"), "build", BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, SubmitError::DuplicateJob));
    }

    #[test]
    fn submit_job_is_blocked_by_hard_quota() {
        let cp = control_plane();
        let entity = EntityId::from("u");
        cp.quota.set_quota(cp_quota_manager::QuotaDefinition {
            quota_id: "q1".to_string(),
            entity_id: entity.clone(),
            entity_type: cp_quota_manager::EntityType::User,
            max_cpu_minutes: u64::MAX,
            max_ram_mb: u64::MAX,
            max_storage_mb: u64::MAX,
            max_concurrent_jobs: 0,
            max_builds_per_day: u32::MAX,
            warning_threshold_percent: 80,
            hard_limit: true,
        });

        let err = cp
            .submit_job(entity, JobId::from("j1"), "build", BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, SubmitError::QuotaExceeded(_)));
        assert!(cp.job_tracker.get_job(&JobId::from("j1")).is_none());
    }

    #[test]
    fn complete_job_marks_tracker_and_stores_artifact() {
        let cp = control_plane();
        cp.submit_job(EntityId::from("u"), JobId::from("j1"), "build", BTreeMap::new())
            .unwrap();
        cp.job_tracker.mark_started(&JobId::from("j1"), cp_types::NodeId::from("n1"));

        let (marked, artifact) = cp.complete_job(
            JobId::from("j1"),
            b"ok".to_vec(),
            ResourceUsage::default(),
            "result.txt",
        );
        assert!(marked);
        assert!(artifact.is_some());
        assert!(cp.job_tracker.get_job(&JobId::from("j1")).is_none());
    }

    #[tokio::test]
    async fn subscribe_all_merges_job_and_quota_events() {
        let cp = control_plane();
        let mut events = Box::pin(cp.subscribe_all());

        cp.submit_job(EntityId::from("u"), JobId::from("j1"), "build", BTreeMap::new())
            .unwrap();
        cp.job_tracker.mark_started(&JobId::from("j1"), cp_types::NodeId::from("n1"));

        let first = events.next().await;
        assert!(matches!(first, Some(ControlPlaneEvent::Job(_))));
    }
}
