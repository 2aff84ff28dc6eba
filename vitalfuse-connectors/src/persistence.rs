//! Background persistence of evicted subject snapshots
//!
//! [`PersistenceHandle`] is the synchronous side. The registry calls it
//! from whichever thread performs the eviction, so it never awaits: it
//! `try_send`s into a bounded tokio channel and counts anything it has to
//! drop. [`PersistenceWorker`] owns the receiving end and writes through a
//! [`SnapshotStore`] under a [`RetryPolicy`].

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use vitalfuse_core::{SnapshotSink, SubjectSnapshot};

use crate::{retry::RetryPolicy, ConnectorError, SnapshotStore};

/// Counters shared by a handle and its worker
#[derive(Debug, Default)]
pub struct PersistenceStats {
    enqueued: AtomicU64,
    written: AtomicU64,
    /// Snapshots whose retries were exhausted
    failed: AtomicU64,
    /// Snapshots rejected because the hand-off queue was full or closed
    dropped: AtomicU64,
    /// Attempts beyond the first
    retries: AtomicU64,
}

/// Point-in-time copy of [`PersistenceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceStatsSnapshot {
    pub enqueued: u64,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
    pub retries: u64,
}

impl PersistenceStats {
    pub fn snapshot(&self) -> PersistenceStatsSnapshot {
        PersistenceStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Create a connected handle/worker pair with a hand-off queue of `capacity`
///
/// Fails with [`ConnectorError::Config`] if `policy` does not validate.
pub fn persistence_channel(
    store: Arc<dyn SnapshotStore>,
    policy: RetryPolicy,
    capacity: usize,
) -> Result<(PersistenceHandle, PersistenceWorker), ConnectorError> {
    policy.validate()?;

    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(PersistenceStats::default());
    Ok((
        PersistenceHandle { sender, stats: Arc::clone(&stats) },
        PersistenceWorker { receiver, store, policy, stats },
    ))
}

/// Non-blocking snapshot sink feeding a [`PersistenceWorker`]
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    sender: mpsc::Sender<SubjectSnapshot>,
    stats: Arc<PersistenceStats>,
}

impl PersistenceHandle {
    pub fn stats(&self) -> PersistenceStatsSnapshot {
        self.stats.snapshot()
    }
}

impl SnapshotSink for PersistenceHandle {
    fn persist(&self, snapshot: SubjectSnapshot) {
        match self.sender.try_send(snapshot) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(snapshot)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "subject {}: persistence queue full, final snapshot at {} ms lost",
                    snapshot.subject_id,
                    snapshot.timestamp
                );
            }
            Err(TrySendError::Closed(snapshot)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "subject {}: persistence worker gone, final snapshot at {} ms lost",
                    snapshot.subject_id,
                    snapshot.timestamp
                );
            }
        }
    }
}

/// Drains the hand-off queue into a store
pub struct PersistenceWorker {
    receiver: mpsc::Receiver<SubjectSnapshot>,
    store: Arc<dyn SnapshotStore>,
    policy: RetryPolicy,
    stats: Arc<PersistenceStats>,
}

impl PersistenceWorker {
    pub fn stats(&self) -> Arc<PersistenceStats> {
        Arc::clone(&self.stats)
    }

    /// Write snapshots until every handle is dropped, then flush
    pub async fn run(mut self) -> PersistenceStatsSnapshot {
        log::info!("persistence worker started for {} store", self.store.name());

        while let Some(snapshot) = self.receiver.recv().await {
            self.persist_one(&snapshot).await;
        }

        if let Err(err) = self.store.flush().await {
            log::error!("{} store flush failed: {}", self.store.name(), err);
        }
        let stats = self.stats.snapshot();
        log::info!(
            "persistence worker stopped: {} written, {} failed, {} dropped",
            stats.written,
            stats.failed,
            stats.dropped
        );
        stats
    }

    async fn persist_one(&self, snapshot: &SubjectSnapshot) {
        let store: &dyn SnapshotStore = self.store.as_ref();
        let result = self
            .policy
            .run(&snapshot.subject_id, move || store.write(snapshot))
            .await;

        match result {
            Ok(((), attempts)) => {
                self.stats.written.fetch_add(1, Ordering::Relaxed);
                self.stats.retries.fetch_add(u64::from(attempts - 1), Ordering::Relaxed);
                log::debug!("subject {}: snapshot persisted", snapshot.subject_id);
            }
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                log::error!(
                    "subject {}: snapshot at {} ms lost: {}",
                    snapshot.subject_id,
                    snapshot.timestamp,
                    err
                );
            }
        }
    }
}

impl std::fmt::Debug for PersistenceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceWorker")
            .field("store", &self.store.name())
            .field("policy", &self.policy)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use std::time::Duration;
    use vitalfuse_core::{
        fusion::{FilterModel, SubjectEstimator},
        tuning::{NoiseHandle, ProcessNoise},
    };

    fn snapshot(id: &str) -> SubjectSnapshot {
        let model = Arc::new(FilterModel::default());
        let noise = NoiseHandle::new(ProcessNoise::new(model.process_noise));
        SubjectEstimator::new(id, model, noise).snapshot()
    }

    #[tokio::test(start_paused = true)]
    async fn worker_retries_transient_failures() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(2);
        let (handle, worker) = persistence_channel(store.clone(), RetryPolicy::default(), 8).unwrap();
        let task = tokio::spawn(worker.run());

        handle.persist(snapshot("a"));
        drop(handle);
        let stats = task.await.unwrap();

        assert_eq!(stats.written, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_count_as_failed() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next(10);
        let policy = RetryPolicy::default().with_max_attempts(3);
        let (handle, worker) = persistence_channel(store.clone(), policy, 8).unwrap();
        let task = tokio::spawn(worker.run());

        handle.persist(snapshot("a"));
        drop(handle);
        let stats = task.await.unwrap();

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.written, 0);
        assert!(store.is_empty());
        assert_eq!(store.stats().messages_failed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out_per_attempt() {
        let store = Arc::new(MemoryStore::new());
        store.set_latency(Some(Duration::from_secs(30)));
        let policy = RetryPolicy::default()
            .with_max_attempts(2)
            .with_attempt_timeout(Duration::from_millis(100));
        let (handle, worker) = persistence_channel(store.clone(), policy, 8).unwrap();
        let task = tokio::spawn(worker.run());

        handle.persist(snapshot("a"));
        drop(handle);
        let stats = task.await.unwrap();

        assert_eq!(stats.failed, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn full_queue_drops_without_blocking() {
        let store = Arc::new(MemoryStore::new());
        let (handle, _worker) = persistence_channel(store, RetryPolicy::default(), 1).unwrap();

        handle.persist(snapshot("a"));
        handle.persist(snapshot("b"));

        let stats = handle.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn unusable_policy_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let policy = RetryPolicy { attempt_timeout_ms: 0, ..RetryPolicy::default() };
        let err = persistence_channel(store.clone(), policy, 4).unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));

        let policy = RetryPolicy::default().with_max_attempts(0);
        assert!(persistence_channel(store, policy, 4).is_err());
    }

    #[test]
    fn closed_worker_drops() {
        let store = Arc::new(MemoryStore::new());
        let (handle, worker) = persistence_channel(store, RetryPolicy::default(), 4).unwrap();
        drop(worker);

        handle.persist(snapshot("a"));
        assert_eq!(handle.stats().dropped, 1);
    }
}
