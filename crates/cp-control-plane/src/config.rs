use cp_artifact_store::ArtifactStoreConfig;
use cp_failover_manager::FailoverManagerConfig;
use cp_idle_manager::IdleManagerConfig;
use cp_job_tracker::JobTrackerConfig;

/// Aggregate configuration for every component a [`crate::ControlPlane`] owns.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlPlaneConfig {
    /// Job archival tunables.
    pub job_tracker: JobTrackerConfig,
    /// Artifact retention tunables.
    pub artifact_store: ArtifactStoreConfig,
    /// Per-region failover tunables.
    pub failover: FailoverManagerConfig,
    /// Per-node idle/sleep tunables.
    pub idle: IdleManagerConfig,
}
