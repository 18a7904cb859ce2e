use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use cp_types::{Clock, EntityId, JobId, NodeId};
use tokio::sync::broadcast;

use crate::job::{ArchivedJob, Job, JobStatus, ResourceUsage};
use crate::notification::{JobNotification, NotificationKind};

/// Error returned by [`JobTracker::track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    /// A job with this id is already tracked (active or archived).
    #[error("job already tracked")]
    DuplicateJob,
}

/// Aggregate statistics reported by [`JobTracker::get_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Number of jobs currently `pending | queued | running`.
    pub active_jobs: usize,
    /// Number of archived jobs with status `success`.
    pub completed_jobs: usize,
    /// Number of archived jobs with status `failed | cancelled | timed_out`.
    pub failed_jobs: usize,
    /// Arithmetic mean of `duration_ms` over archived `success` jobs,
    /// rounded to the nearest millisecond; `0` when there are none.
    pub avg_duration_ms: i64,
}

/// Tunables for [`JobTracker`] (spec §4.1 "Archival").
#[derive(Debug, Clone, Copy)]
pub struct JobTrackerConfig {
    /// Maximum number of archived jobs retained; oldest are evicted first.
    pub max_history: usize,
}

impl Default for JobTrackerConfig {
    fn default() -> Self {
        Self { max_history: 10_000 }
    }
}

struct State {
    active: HashMap<JobId, Job>,
    history: VecDeque<ArchivedJob>,
}

struct Inner {
    config: JobTrackerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    events: broadcast::Sender<JobNotification>,
}

/// Authoritative lifecycle tracker for every job (spec §4.1).
///
/// Cheap to clone: clones share the same underlying state via `Arc`, the
/// same handle-over-inner shape as the teacher's `EngineHandle` over
/// `EngineInner`.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<Inner>,
}

impl JobTracker {
    /// Builds a tracker with the given configuration and clock.
    pub fn new(config: JobTrackerConfig, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                state: Mutex::new(State {
                    active: HashMap::new(),
                    history: VecDeque::new(),
                }),
                events,
            }),
        }
    }

    /// Subscribes to the ordered notification stream.
    pub fn subscribe(&self) -> broadcast::Receiver<JobNotification> {
        self.inner.events.subscribe()
    }

    fn emit(&self, job_id: &JobId, event: NotificationKind, message: impl Into<String>) {
        let note = JobNotification {
            job_id: job_id.clone(),
            event,
            timestamp: self.inner.clock.now_ms(),
            message: message.into(),
        };
        tracing::debug!(job_id = %note.job_id, event = ?note.event, "job notification");
        let _ = self.inner.events.send(note);
    }

    /// Inserts a new `pending` job.
    ///
    /// Fails with [`TrackError::DuplicateJob`] if `job_id` is already active
    /// or archived.
    pub fn track(
        &self,
        job_id: JobId,
        job_type: impl Into<String>,
        user_id: Option<EntityId>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Job, TrackError> {
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock().expect("job tracker state poisoned");
        if state.active.contains_key(&job_id)
            || state.history.iter().any(|j| j.job().job_id == job_id)
        {
            return Err(TrackError::DuplicateJob);
        }
        let job = Job::new(job_id.clone(), job_type.into(), user_id, metadata, now);
        state.active.insert(job_id, job.clone());
        Ok(job)
    }

    /// Transitions a job from `pending` to `queued` (spec §9 open question:
    /// reserved for adapters that model broker admission).
    ///
    /// Returns `false` if the job is missing or not currently `pending`.
    pub fn mark_queued(&self, job_id: &JobId) -> bool {
        let mut state = self.inner.state.lock().expect("job tracker state poisoned");
        let Some(job) = state.active.get_mut(job_id) else {
            return false;
        };
        if job.status != JobStatus::Pending {
            return false;
        }
        job.status = JobStatus::Queued;
        true
    }

    /// Transitions a job to `running` (spec §4.1 `markStarted`).
    ///
    /// Valid only from `pending` or `queued`. Emits a `started` notification.
    pub fn mark_started(&self, job_id: &JobId, node_id: NodeId) -> bool {
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock().expect("job tracker state poisoned");
        let Some(job) = state.active.get_mut(job_id) else {
            return false;
        };
        if !matches!(job.status, JobStatus::Pending | JobStatus::Queued) {
            return false;
        }
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.node_id = Some(node_id.clone());
        let message = format!("job started on node {node_id}");
        self.emit(job_id, NotificationKind::Started, message);
        true
    }

    /// Clamps `progress` to `[0, 100]` and records it (spec §4.1
    /// `updateProgress`).
    ///
    /// No-op (and returns `false`) once the job is terminal or missing.
    pub fn update_progress(&self, job_id: &JobId, progress: i32) -> bool {
        let clamped = progress.clamp(0, 100) as u8;
        let mut state = self.inner.state.lock().expect("job tracker state poisoned");
        let Some(job) = state.active.get_mut(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        job.progress = clamped;
        self.emit(
            job_id,
            NotificationKind::Progress,
            format!("progress {clamped}%"),
        );
        true
    }

    fn archive(&self, state: &mut State, mut job: Job) {
        if let (Some(started), Some(completed)) = (job.started_at, job.completed_at) {
            job.duration_ms = Some(completed - started);
        }
        if state.history.len() >= self.inner.config.max_history {
            state.history.pop_front();
        }
        state.history.push_back(ArchivedJob::new(job));
    }

    /// Transitions a job to `success` (spec §4.1 `markCompleted`).
    ///
    /// Valid only from `running`. Sets `progress = 100`, `exit_code = 0`,
    /// computes `duration_ms`, and archives the job.
    pub fn mark_completed(
        &self,
        job_id: &JobId,
        output: Option<String>,
        resource_usage: Option<ResourceUsage>,
    ) -> bool {
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock().expect("job tracker state poisoned");
        let Some(mut job) = state.active.remove(job_id) else {
            return false;
        };
        if job.status != JobStatus::Running {
            state.active.insert(job_id.clone(), job);
            return false;
        }
        job.status = JobStatus::Success;
        job.progress = 100;
        job.completed_at = Some(now);
        job.exit_code = Some(0);
        let mut usage = resource_usage.unwrap_or(job.resource_usage);
        if let Some(out) = &output {
            usage.output_size_bytes = out.len() as u64;
        }
        job.resource_usage = usage;
        job.output = output;
        self.archive(&mut state, job);
        self.emit(job_id, NotificationKind::Completed, "job completed");
        true
    }

    /// Transitions a job to `failed` (spec §4.1 `markFailed`).
    ///
    /// Valid from `pending | queued | running`. `exit_code` defaults to `1`.
    pub fn mark_failed(&self, job_id: &JobId, error: impl Into<String>, exit_code: Option<i32>) -> bool {
        let now = self.inner.clock.now_ms();
        let error = error.into();
        let mut state = self.inner.state.lock().expect("job tracker state poisoned");
        let Some(mut job) = state.active.remove(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            state.active.insert(job_id.clone(), job);
            return false;
        }
        job.status = JobStatus::Failed;
        job.completed_at = Some(now);
        job.exit_code = Some(exit_code.unwrap_or(1));
        job.output = Some(error.clone());
        self.archive(&mut state, job);
        self.emit(job_id, NotificationKind::Failed, error);
        true
    }

    /// Transitions a job to `cancelled` (spec §4.1 `markCancelled`).
    ///
    /// Valid from any non-terminal status.
    pub fn mark_cancelled(&self, job_id: &JobId) -> bool {
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock().expect("job tracker state poisoned");
        let Some(mut job) = state.active.remove(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            state.active.insert(job_id.clone(), job);
            return false;
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(now);
        self.archive(&mut state, job);
        self.emit(job_id, NotificationKind::Cancelled, "job cancelled");
        true
    }

    /// Transitions a job to `timed_out` from the outside (spec §5: the core
    /// itself never times jobs out, only accepts the transition).
    pub fn mark_timed_out(&self, job_id: &JobId) -> bool {
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock().expect("job tracker state poisoned");
        let Some(mut job) = state.active.remove(job_id) else {
            return false;
        };
        if job.status.is_terminal() {
            state.active.insert(job_id.clone(), job);
            return false;
        }
        job.status = JobStatus::TimedOut;
        job.completed_at = Some(now);
        self.archive(&mut state, job);
        self.emit(job_id, NotificationKind::Failed, "job timed out");
        true
    }

    /// Looks up a job by id, active or archived.
    ///
    /// Returns `None` for a missing id, including one already archived and
    /// evicted from history — matching spec §8 scenario S6, where
    /// `get_job` returns `None` immediately after `mark_completed` archives
    /// the job.
    pub fn get_job(&self, job_id: &JobId) -> Option<Job> {
        let state = self.inner.state.lock().expect("job tracker state poisoned");
        state.active.get(job_id).cloned()
    }

    /// Returns every job with status `pending | queued | running` (spec
    /// §4.1 `getActiveJobs`).
    pub fn get_active_jobs(&self) -> Vec<Job> {
        let state = self.inner.state.lock().expect("job tracker state poisoned");
        state.active.values().cloned().collect()
    }

    /// Returns archived jobs, most recently archived first, capped to
    /// `limit` entries when given.
    pub fn get_history(&self, limit: Option<usize>) -> Vec<ArchivedJob> {
        let state = self.inner.state.lock().expect("job tracker state poisoned");
        let iter = state.history.iter().rev().cloned();
        match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        }
    }

    /// Returns every currently active job owned by `user_id`.
    pub fn get_jobs_by_user(&self, user_id: &EntityId) -> Vec<Job> {
        let state = self.inner.state.lock().expect("job tracker state poisoned");
        state
            .active
            .values()
            .filter(|job| job.user_id.as_ref() == Some(user_id))
            .cloned()
            .collect()
    }

    /// Computes aggregate statistics over active jobs and retained history.
    pub fn get_stats(&self) -> JobStats {
        let state = self.inner.state.lock().expect("job tracker state poisoned");
        let active_jobs = state.active.len();
        let mut completed_jobs = 0usize;
        let mut failed_jobs = 0usize;
        let mut duration_sum = 0i64;
        let mut duration_count = 0i64;
        for archived in &state.history {
            let job = archived.job();
            match job.status {
                JobStatus::Success => {
                    completed_jobs += 1;
                    if let Some(d) = job.duration_ms {
                        duration_sum += d;
                        duration_count += 1;
                    }
                }
                JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut => {
                    failed_jobs += 1;
                }
                JobStatus::Pending | JobStatus::Queued | JobStatus::Running => {}
            }
        }
        let avg_duration_ms = if duration_count > 0 {
            ((duration_sum as f64) / (duration_count as f64)).round() as i64
        } else {
            0
        };
        JobStats {
            active_jobs,
            completed_jobs,
            failed_jobs,
            avg_duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cp_types::ManualClock;

    fn tracker() -> (JobTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let tracker = JobTracker::new(JobTrackerConfig::default(), clock.clone());
        (tracker, clock)
    }

    #[test]
    fn duplicate_track_is_rejected() {
        let (t, _clock) = tracker();
        t.track(JobId::from("j"), "build", None, BTreeMap::new()).unwrap();
        let err = t
            .track(JobId::from("j"), "build", None, BTreeMap::new())
            .unwrap_err();
        assert_eq!(err, TrackError::DuplicateJob);
    }

    #[test]
    fn missing_job_operations_return_false_or_none() {
        let (t, _clock) = tracker();
        let missing = JobId::from("nope");
        assert!(!t.mark_started(&missing, NodeId::from("n1")));
        assert!(!t.update_progress(&missing, 50));
        assert!(!t.mark_completed(&missing, None, None));
        assert!(!t.mark_failed(&missing, "x", None));
        assert!(!t.mark_cancelled(&missing));
        assert!(t.get_job(&missing).is_none());
    }

    #[test]
    fn full_lifecycle_matches_scenario_s6() {
        let (t, clock) = tracker();
        let job_id = JobId::from("j");
        t.track(job_id.clone(), "build", None, BTreeMap::new()).unwrap();

        let mut events = t.subscribe();

        clock.set_ms(1_000);
        assert!(t.mark_started(&job_id, NodeId::from("node1")));

        for p in [25, 50, 75] {
            assert!(t.update_progress(&job_id, p));
        }

        clock.set_ms(4_000);
        assert!(t.mark_completed(&job_id, Some("ok".to_string()), None));

        assert!(t.get_job(&job_id).is_none());

        let history = t.get_history(Some(1));
        assert_eq!(history.len(), 1);
        let archived = history[0].job();
        assert_eq!(archived.status, JobStatus::Success);
        assert_eq!(archived.progress, 100);
        assert_eq!(archived.duration_ms, Some(3_000));
        assert_eq!(archived.resource_usage.output_size_bytes, 2);

        let mut kinds = Vec::new();
        while let Ok(note) = events.try_recv() {
            kinds.push(note.event);
        }
        assert_eq!(
            kinds,
            vec![
                NotificationKind::Started,
                NotificationKind::Progress,
                NotificationKind::Progress,
                NotificationKind::Progress,
                NotificationKind::Completed,
            ]
        );
    }

    #[test]
    fn terminal_jobs_reject_further_transitions() {
        let (t, _clock) = tracker();
        let job_id = JobId::from("j");
        t.track(job_id.clone(), "build", None, BTreeMap::new()).unwrap();
        t.mark_started(&job_id, NodeId::from("n"));
        t.mark_failed(&job_id, "boom", None);

        assert!(!t.mark_failed(&job_id, "again", None));
        assert!(!t.mark_cancelled(&job_id));
        assert!(!t.update_progress(&job_id, 10));
    }

    #[test]
    fn progress_is_clamped() {
        let (t, _clock) = tracker();
        let job_id = JobId::from("j");
        t.track(job_id.clone(), "build", None, BTreeMap::new()).unwrap();
        t.mark_started(&job_id, NodeId::from("n"));
        t.update_progress(&job_id, 150);
        assert_eq!(t.get_job(&job_id).unwrap().progress, 100);
        t.update_progress(&job_id, -10);
        assert_eq!(t.get_job(&job_id).unwrap().progress, 0);
    }

    #[test]
    fn history_eviction_is_fifo_capped() {
        let clock = Arc::new(ManualClock::new(0));
        let tracker = JobTracker::new(JobTrackerConfig { max_history: 2 }, clock);
        for i in 0..3 {
            let id = JobId::from(format!("j{i}"));
            tracker.track(id.clone(), "build", None, BTreeMap::new()).unwrap();
            tracker.mark_started(&id, NodeId::from("n"));
            tracker.mark_completed(&id, None, None);
        }
        let history = tracker.get_history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].job().job_id, JobId::from("j2"));
        assert_eq!(history[1].job().job_id, JobId::from("j1"));
    }

    #[test]
    fn average_duration_rounds_and_defaults_to_zero() {
        let (t, clock) = tracker();
        assert_eq!(t.get_stats().avg_duration_ms, 0);

        let id = JobId::from("j");
        t.track(id.clone(), "build", None, BTreeMap::new()).unwrap();
        clock.set_ms(0);
        t.mark_started(&id, NodeId::from("n"));
        clock.set_ms(1_000);
        t.mark_completed(&id, None, None);
        assert_eq!(t.get_stats().avg_duration_ms, 1_000);
    }
}
