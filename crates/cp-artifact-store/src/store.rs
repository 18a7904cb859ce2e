use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cp_types::{ArtifactId, Clock, ConfigError, IdGenerator, JobId};
use sha2::{Digest, Sha256};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::artifact::{Artifact, ArtifactMetadata};

const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;
const BYTES_PER_MIB: u64 = 1024 * 1024;
const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Tunables for [`ArtifactStore`] (spec §4.2 "Defaults").
#[derive(Debug, Clone, Copy)]
pub struct ArtifactStoreConfig {
    /// Time-to-live applied to every stored artifact, in milliseconds.
    pub max_age_ms: u64,
    /// Cap on the sum of `size_bytes` across all live artifacts.
    pub max_total_size_bytes: u64,
    /// Cap on the number of live artifacts per job.
    pub max_per_job: usize,
    /// Cap on a single artifact's size.
    pub max_artifact_size_bytes: u64,
}

impl Default for ArtifactStoreConfig {
    fn default() -> Self {
        Self {
            max_age_ms: 7 * MS_PER_DAY,
            max_total_size_bytes: 10 * BYTES_PER_GIB,
            max_per_job: 50,
            max_artifact_size_bytes: 500 * BYTES_PER_MIB,
        }
    }
}

/// Aggregate usage statistics (spec §4.2 `getStats`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactStats {
    /// Number of live artifacts.
    pub total_artifacts: usize,
    /// Sum of `size_bytes` across live artifacts.
    pub total_size_bytes: u64,
    /// Number of distinct jobs with at least one live artifact.
    pub total_jobs: usize,
    /// `ArtifactStoreConfig::max_total_size_bytes`.
    pub max_size_bytes: u64,
    /// `round(100 * total_size_bytes / max_size_bytes)`.
    pub usage_percent: u64,
}

struct StoredEntry {
    metadata: ArtifactMetadata,
    content: Vec<u8>,
}

struct State {
    by_id: HashMap<ArtifactId, StoredEntry>,
    by_job: HashMap<JobId, Vec<ArtifactId>>,
    /// Oldest-first order of live artifacts, for eviction (spec §4.2
    /// "Eviction policy"). Ties in `stored_at` break by insertion order,
    /// which is exactly what a `VecDeque` appended to under one lock gives.
    order: VecDeque<ArtifactId>,
    total_size_bytes: u64,
}

struct Inner {
    config: ArtifactStoreConfig,
    clock: Arc<dyn Clock>,
    id_gen: Arc<dyn IdGenerator>,
    state: Mutex<State>,
    cleanup_stop: AtomicBool,
    cleanup_notify: Notify,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

/// Bounded, content-addressed blob store (spec §4.2).
#[derive(Clone)]
pub struct ArtifactStore {
    inner: Arc<Inner>,
}

impl ArtifactStore {
    /// Builds a store with the given configuration, clock, and id generator.
    ///
    /// Refuses a non-positive `max_age_ms`, `max_total_size_bytes`,
    /// `max_per_job`, or `max_artifact_size_bytes` (spec §7 "Configuration
    /// error").
    pub fn new(config: ArtifactStoreConfig, clock: Arc<dyn Clock>, id_gen: Arc<dyn IdGenerator>) -> Result<Self, ConfigError> {
        ConfigError::require_positive("max_age_ms", config.max_age_ms as i64)?;
        ConfigError::require_positive("max_total_size_bytes", config.max_total_size_bytes as i64)?;
        ConfigError::require_positive("max_per_job", config.max_per_job as i64)?;
        ConfigError::require_positive("max_artifact_size_bytes", config.max_artifact_size_bytes as i64)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                clock,
                id_gen,
                state: Mutex::new(State {
                    by_id: HashMap::new(),
                    by_job: HashMap::new(),
                    order: VecDeque::new(),
                    total_size_bytes: 0,
                }),
                cleanup_stop: AtomicBool::new(false),
                cleanup_notify: Notify::new(),
                cleanup_task: Mutex::new(None),
            }),
        })
    }

    /// Stores `content` for `job_id`, returning metadata on success.
    ///
    /// Returns `None` when the content exceeds
    /// `max_artifact_size_bytes`, the job is already at `max_per_job`, or
    /// eviction cannot free enough space to satisfy
    /// `max_total_size_bytes` (spec §4.2 steps 1-3).
    pub fn store(
        &self,
        job_id: JobId,
        name: impl Into<String>,
        content: Vec<u8>,
        content_type: Option<String>,
        labels: BTreeMap<String, String>,
    ) -> Option<ArtifactMetadata> {
        let content_len = content.len() as u64;
        if content_len > self.inner.config.max_artifact_size_bytes {
            tracing::warn!(job_id = %job_id, size = content_len, "artifact rejected: too large");
            return None;
        }

        let mut state = self.inner.state.lock().expect("artifact store state poisoned");

        let per_job_count = state.by_job.get(&job_id).map(Vec::len).unwrap_or(0);
        if per_job_count >= self.inner.config.max_per_job {
            tracing::warn!(job_id = %job_id, "artifact rejected: per-job artifact cap reached");
            return None;
        }

        let projected = state.total_size_bytes + content_len;
        if projected > self.inner.config.max_total_size_bytes {
            let required = projected - self.inner.config.max_total_size_bytes;
            evict_oldest_first(&mut state, required);
            if state.total_size_bytes + content_len > self.inner.config.max_total_size_bytes {
                tracing::warn!(job_id = %job_id, "artifact rejected: eviction could not free enough space");
                return None;
            }
        }

        let checksum = hex_sha256(&content);
        let now = self.inner.clock.now_ms();
        let artifact_id = ArtifactId::new(self.inner.id_gen.generate());

        let metadata = ArtifactMetadata {
            artifact_id: artifact_id.clone(),
            job_id: job_id.clone(),
            name: name.into(),
            content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            size_bytes: content_len,
            stored_at: now,
            expires_at: Some(now + self.inner.config.max_age_ms as i64),
            checksum,
            labels,
        };

        state.total_size_bytes += content_len;
        state.order.push_back(artifact_id.clone());
        state.by_job.entry(job_id).or_default().push(artifact_id.clone());
        state.by_id.insert(
            artifact_id,
            StoredEntry {
                metadata: metadata.clone(),
                content,
            },
        );

        Some(metadata)
    }

    /// Retrieves an artifact (metadata + content) by id.
    pub fn get(&self, artifact_id: &ArtifactId) -> Option<Artifact> {
        let state = self.inner.state.lock().expect("artifact store state poisoned");
        state.by_id.get(artifact_id).map(|entry| Artifact {
            metadata: entry.metadata.clone(),
            content: entry.content.clone(),
        })
    }

    /// Lists metadata for every live artifact belonging to `job_id`.
    pub fn list_by_job(&self, job_id: &JobId) -> Vec<ArtifactMetadata> {
        let state = self.inner.state.lock().expect("artifact store state poisoned");
        state
            .by_job
            .get(job_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.by_id.get(id).map(|e| e.metadata.clone()))
            .collect()
    }

    /// Deletes a single artifact by id. Returns `false` if it did not exist.
    pub fn delete(&self, artifact_id: &ArtifactId) -> bool {
        let mut state = self.inner.state.lock().expect("artifact store state poisoned");
        remove_one(&mut state, artifact_id)
    }

    /// Deletes every artifact belonging to `job_id`. Returns the count removed.
    pub fn delete_by_job(&self, job_id: &JobId) -> usize {
        let mut state = self.inner.state.lock().expect("artifact store state poisoned");
        let ids = state.by_job.get(job_id).cloned().unwrap_or_default();
        let mut removed = 0;
        for id in ids {
            if remove_one(&mut state, &id) {
                removed += 1;
            }
        }
        removed
    }

    /// Removes every artifact whose `expires_at <= now`. Returns the count removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.inner.clock.now_ms();
        let mut state = self.inner.state.lock().expect("artifact store state poisoned");
        let expired: Vec<ArtifactId> = state
            .by_id
            .iter()
            .filter(|(_, entry)| matches!(entry.metadata.expires_at, Some(exp) if exp <= now))
            .map(|(id, _)| id.clone())
            .collect();
        let mut removed = 0;
        for id in expired {
            if remove_one(&mut state, &id) {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "expired artifacts cleaned up");
        }
        removed
    }

    /// Reports aggregate usage statistics.
    pub fn get_stats(&self) -> ArtifactStats {
        let state = self.inner.state.lock().expect("artifact store state poisoned");
        let max = self.inner.config.max_total_size_bytes;
        let usage_percent = if max == 0 {
            0
        } else {
            ((state.total_size_bytes as f64 / max as f64) * 100.0).round() as u64
        };
        ArtifactStats {
            total_artifacts: state.by_id.len(),
            total_size_bytes: state.total_size_bytes,
            total_jobs: state.by_job.values().filter(|v| !v.is_empty()).count(),
            max_size_bytes: max,
            usage_percent,
        }
    }

    /// Starts a background task that calls `cleanup_expired` every
    /// `interval_ms` milliseconds, until `stop_cleanup` is called.
    pub fn start_cleanup(&self, interval_ms: u64) {
        self.inner.cleanup_stop.store(false, Ordering::SeqCst);
        let store = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                if store.inner.cleanup_stop.load(Ordering::SeqCst) {
                    return;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        store.cleanup_expired();
                    }
                    _ = store.inner.cleanup_notify.notified() => {
                        return;
                    }
                }
            }
        });
        let mut slot = self.inner.cleanup_task.lock().expect("cleanup task lock poisoned");
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Stops the background cleanup task started by `start_cleanup`.
    ///
    /// The stop flag is observed by the running task before its next tick
    /// fires, whether it is currently waiting on the interval or already
    /// mid-tick.
    pub fn stop_cleanup(&self) {
        self.inner.cleanup_stop.store(true, Ordering::SeqCst);
        self.inner.cleanup_notify.notify_waiters();
        if let Some(handle) = self.inner.cleanup_task.lock().expect("cleanup task lock poisoned").take() {
            handle.abort();
        }
    }
}

fn remove_one(state: &mut State, artifact_id: &ArtifactId) -> bool {
    let Some(entry) = state.by_id.remove(artifact_id) else {
        return false;
    };
    state.total_size_bytes = state.total_size_bytes.saturating_sub(entry.metadata.size_bytes);
    state.order.retain(|id| id != artifact_id);
    if let Some(ids) = state.by_job.get_mut(&entry.metadata.job_id) {
        ids.retain(|id| id != artifact_id);
        if ids.is_empty() {
            state.by_job.remove(&entry.metadata.job_id);
        }
    }
    true
}

fn evict_oldest_first(state: &mut State, required_bytes: u64) {
    let mut freed = 0u64;
    while freed < required_bytes {
        let Some(oldest) = state.order.front().cloned() else {
            break;
        };
        let Some(entry) = state.by_id.get(&oldest) else {
            state.order.pop_front();
            continue;
        };
        let size = entry.metadata.size_bytes;
        remove_one(state, &oldest);
        freed += size;
    }
}

fn hex_sha256(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cp_types::{ManualClock, RandomIdGenerator};

    fn new_store(config: ArtifactStoreConfig) -> (ArtifactStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let store = ArtifactStore::new(config, clock.clone(), Arc::new(RandomIdGenerator)).expect("valid config");
        (store, clock)
    }

    #[test]
    fn new_rejects_non_positive_max_total_size_bytes() {
        let err = ArtifactStore::new(
            ArtifactStoreConfig {
                max_total_size_bytes: 0,
                ..ArtifactStoreConfig::default()
            },
            Arc::new(ManualClock::new(0)),
            Arc::new(RandomIdGenerator),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotPositive {
                field: "max_total_size_bytes",
                value: 0
            }
        );
    }

    #[test]
    fn checksum_and_size_invariants_hold() {
        let (store, _clock) = new_store(ArtifactStoreConfig::default());
        let content = b"hello world".to_vec();
        let meta = store
            .store(JobId::from("j"), "out.txt", content.clone(), None, BTreeMap::new())
            .unwrap();

        assert_eq!(meta.size_bytes, content.len() as u64);
        assert_eq!(meta.checksum, hex_sha256(&content));

        let fetched = store.get(&meta.artifact_id).unwrap();
        assert_eq!(hex_sha256(&fetched.content), fetched.metadata.checksum);
    }

    #[test]
    fn rejects_oversized_artifact() {
        let (store, _clock) = new_store(ArtifactStoreConfig {
            max_artifact_size_bytes: 4,
            ..ArtifactStoreConfig::default()
        });
        let result = store.store(JobId::from("j"), "a", vec![0u8; 5], None, BTreeMap::new());
        assert!(result.is_none());
    }

    #[test]
    fn rejects_beyond_per_job_cap() {
        let (store, _clock) = new_store(ArtifactStoreConfig {
            max_per_job: 1,
            ..ArtifactStoreConfig::default()
        });
        let job = JobId::from("j");
        assert!(store.store(job.clone(), "a", vec![1], None, BTreeMap::new()).is_some());
        assert!(store.store(job, "b", vec![2], None, BTreeMap::new()).is_none());
    }

    /// Scenario S2 (spec §8): store A (400B), B (400B), C (400B) with a
    /// 1000B total cap; storing C evicts A; final live set is {B, C} and
    /// `total_size_bytes == 800`.
    #[test]
    fn scenario_s2_eviction_keeps_newest() {
        let (store, clock) = new_store(ArtifactStoreConfig {
            max_total_size_bytes: 1000,
            ..ArtifactStoreConfig::default()
        });
        let job = JobId::from("j");

        clock.set_ms(1);
        let a = store.store(job.clone(), "a", vec![0u8; 400], None, BTreeMap::new()).unwrap();
        clock.set_ms(2);
        let b = store.store(job.clone(), "b", vec![0u8; 400], None, BTreeMap::new()).unwrap();
        clock.set_ms(3);
        let c = store.store(job.clone(), "c", vec![0u8; 400], None, BTreeMap::new()).unwrap();

        assert!(store.get(&a.artifact_id).is_none());
        assert!(store.get(&b.artifact_id).is_some());
        assert!(store.get(&c.artifact_id).is_some());
        assert_eq!(store.get_stats().total_size_bytes, 800);
    }

    #[test]
    fn cleanup_expired_removes_only_past_ttl() {
        let (store, clock) = new_store(ArtifactStoreConfig {
            max_age_ms: 100,
            ..ArtifactStoreConfig::default()
        });
        let meta = store
            .store(JobId::from("j"), "a", vec![1, 2, 3], None, BTreeMap::new())
            .unwrap();

        assert_eq!(store.cleanup_expired(), 0);
        clock.advance_ms(101);
        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.get(&meta.artifact_id).is_none());
    }

    #[test]
    fn delete_by_job_removes_all_and_frees_bytes() {
        let (store, _clock) = new_store(ArtifactStoreConfig::default());
        let job = JobId::from("j");
        store.store(job.clone(), "a", vec![1; 10], None, BTreeMap::new());
        store.store(job.clone(), "b", vec![1; 20], None, BTreeMap::new());
        assert_eq!(store.delete_by_job(&job), 2);
        assert_eq!(store.get_stats().total_size_bytes, 0);
        assert!(store.list_by_job(&job).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn background_cleanup_is_cancellable() {
        let (store, clock) = new_store(ArtifactStoreConfig {
            max_age_ms: 10,
            ..ArtifactStoreConfig::default()
        });
        let meta = store
            .store(JobId::from("j"), "a", vec![1], None, BTreeMap::new())
            .unwrap();
        clock.advance_ms(11);

        store.start_cleanup(5);
        tokio::time::advance(std::time::Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        store.stop_cleanup();

        assert!(store.get(&meta.artifact_id).is_none());
    }

    proptest::proptest! {
        /// Spec §4.2: `size_bytes` always matches the stored content's
        /// length, and `checksum` always matches its SHA-256 digest,
        /// regardless of content.
        #[test]
        fn checksum_and_size_invariants_hold_for_arbitrary_content(content in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..4096)) {
            let (store, _clock) = new_store(ArtifactStoreConfig::default());
            let meta = store
                .store(JobId::from("j"), "out.bin", content.clone(), None, BTreeMap::new())
                .expect("content fits under default limits");

            proptest::prop_assert_eq!(meta.size_bytes, content.len() as u64);
            proptest::prop_assert_eq!(&meta.checksum, &hex_sha256(&content));

            let fetched = store.get(&meta.artifact_id).expect("just stored");
            proptest::prop_assert_eq!(fetched.content, content);
        }

        /// Spec §4.2 "Eviction policy": after storing an arbitrary sequence
        /// of same-size artifacts, live `total_size_bytes` never exceeds
        /// `max_total_size_bytes`.
        #[test]
        fn total_size_never_exceeds_cap_over_arbitrary_sequence(sizes in proptest::collection::vec(1u64..=200, 0..50)) {
            let (store, clock) = new_store(ArtifactStoreConfig {
                max_total_size_bytes: 500,
                ..ArtifactStoreConfig::default()
            });
            let job = JobId::from("j");
            for (i, size) in sizes.into_iter().enumerate() {
                clock.set_ms(i as i64);
                store.store(job.clone(), format!("a{i}"), vec![0u8; size as usize], None, BTreeMap::new());
                proptest::prop_assert!(store.get_stats().total_size_bytes <= 500);
            }
        }
    }
}
