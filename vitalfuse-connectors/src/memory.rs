//! In-memory snapshot store
//!
//! Keeps everything it receives. Failures and latency can be injected so
//! retry and timeout paths are testable without a real backend.

use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use vitalfuse_core::SubjectSnapshot;

use crate::{ConnectionStats, ConnectorError, SnapshotStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: Mutex<Vec<SubjectSnapshot>>,
    stats: Mutex<ConnectionStats>,
    fail_next: AtomicU32,
    latency: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail as unavailable
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Delay every write by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Copies of everything stored so far, in write order
    pub fn snapshots(&self) -> Vec<SubjectSnapshot> {
        self.snapshots.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    async fn write(&self, snapshot: &SubjectSnapshot) -> Result<(), ConnectorError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            let err = ConnectorError::Unavailable("injected failure".into());
            self.stats.lock().record_failure(&err);
            return Err(err);
        }

        self.snapshots.lock().push(snapshot.clone());
        self.stats.lock().record_success(0);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn stats(&self) -> ConnectionStats {
        self.stats.lock().clone()
    }
}
