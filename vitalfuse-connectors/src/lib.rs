//! Persistence and export connectors for VitalFuse
//!
//! ## Overview
//!
//! The core engine is synchronous and never performs I/O inside a
//! per-subject critical section. When a subject is evicted, its final
//! snapshot is handed to a [`vitalfuse_core::SnapshotSink`]. This crate
//! supplies a sink that moves snapshots onto a tokio task and writes them
//! to a [`SnapshotStore`] with bounded retry.
//!
//! ```text
//! registry ──persist()──► PersistenceHandle ──mpsc──► PersistenceWorker ──► SnapshotStore
//!   (sync, try_send)                              (retry + per-attempt timeout)
//! ```
//!
//! ## Stores
//!
//! | Store            | Use                                   |
//! |------------------|---------------------------------------|
//! | `MemoryStore`    | Tests, failure injection              |
//! | `JsonLinesStore` | Append-only local file, one per line  |
//! | `HttpStore`      | POST to a REST endpoint (`http`)      |
//!
//! ## Failure Handling
//!
//! - A full hand-off queue drops the snapshot and logs a data-loss error
//!   rather than blocking ingestion.
//! - Each write attempt is bounded by a timeout. Failed attempts back off
//!   exponentially: `base * 2^attempt`, capped.
//! - Exhausted retries surface as [`ConnectorError::PersistenceWriteFailure`]
//!   and are logged at error level.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use vitalfuse_connectors::{persistence_channel, JsonLinesStore, RetryPolicy};
//! use vitalfuse_core::{FusionConfig, SubjectRegistry, SystemTime};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(JsonLinesStore::new("snapshots.jsonl"));
//! let (handle, worker) = persistence_channel(store, RetryPolicy::default(), 256)?;
//! let worker = tokio::spawn(worker.run());
//!
//! let registry = SubjectRegistry::new(FusionConfig::default(), Arc::new(SystemTime))?
//!     .with_snapshot_sink(Arc::new(handle));
//! // ... ingest, evict ...
//! drop(registry);
//! worker.await?;
//! # Ok(())
//! # }
//! ```

pub mod file;
pub mod memory;
pub mod persistence;
pub mod retry;

#[cfg(feature = "http")]
pub mod http;

pub use file::JsonLinesStore;
pub use memory::MemoryStore;
pub use persistence::{persistence_channel, PersistenceHandle, PersistenceStats, PersistenceWorker};
pub use retry::RetryPolicy;

#[cfg(feature = "http")]
pub use http::{HttpConfig, HttpStore};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vitalfuse_core::SubjectSnapshot;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Retries exhausted; the snapshot is lost
    #[error("persisting snapshot for {subject_id} failed after {attempts} attempts")]
    PersistenceWriteFailure { subject_id: String, attempts: u32 },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Store refused or could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ConnectorError {
    /// False for errors another attempt cannot fix
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Serialization(_) | Self::Config(_))
    }
}

/// Destination for final subject snapshots
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Write one snapshot
    async fn write(&self, snapshot: &SubjectSnapshot) -> Result<(), ConnectorError>;

    /// Make previous writes durable
    async fn flush(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    /// Short label for logs
    fn name(&self) -> &'static str;

    /// Get connection statistics
    fn stats(&self) -> ConnectionStats;
}

/// Connection statistics common to all stores
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Total snapshots written successfully
    pub messages_sent: u64,
    /// Total write attempts that failed
    pub messages_failed: u64,
    /// Total bytes written
    pub bytes_sent: u64,
    /// Last error message
    pub last_error: Option<String>,
}

impl ConnectionStats {
    pub(crate) fn record_success(&mut self, bytes: usize) {
        self.messages_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_failure(&mut self, error: &ConnectorError) {
        self.messages_failed += 1;
        self.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(ConnectorError::Timeout(Duration::from_millis(5)).is_retryable());
        assert!(ConnectorError::Unavailable("down".into()).is_retryable());
        assert!(!ConnectorError::Config("bad url".into()).is_retryable());
    }

    #[test]
    fn stats_accumulate() {
        let mut stats = ConnectionStats::default();
        stats.record_success(120);
        stats.record_failure(&ConnectorError::Unavailable("503".into()));
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.bytes_sent, 120);
        assert_eq!(stats.messages_failed, 1);
        assert_eq!(stats.last_error.as_deref(), Some("store unavailable: 503"));
    }
}
