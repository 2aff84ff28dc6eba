//! Append-only JSON-lines snapshot file
//!
//! One serialized [`SubjectSnapshot`] per line. Writes are serialized
//! through an async mutex so concurrent writers never interleave lines.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex as AsyncMutex,
};
use vitalfuse_core::SubjectSnapshot;

use crate::{ConnectionStats, ConnectorError, SnapshotStore};

#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    file: AsyncMutex<Option<File>>,
    stats: Mutex<ConnectionStats>,
}

impl JsonLinesStore {
    /// Store appending to `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: AsyncMutex::new(None),
            stats: Mutex::new(ConnectionStats::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every snapshot back, skipping blank lines
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<SubjectSnapshot>, ConnectorError> {
        let text = tokio::fs::read_to_string(path).await?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(ConnectorError::from))
            .collect()
    }

    async fn append(&self, line: &[u8]) -> Result<(), ConnectorError> {
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
            *guard = Some(file);
        }
        if let Some(file) = guard.as_mut() {
            let written = match file.write_all(line).await {
                Ok(()) => file.flush().await,
                Err(err) => Err(err),
            };
            if let Err(err) = written {
                // Reopen on the next attempt
                *guard = None;
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn record(&self, result: &Result<(), ConnectorError>, bytes: usize) {
        let mut stats = self.stats.lock();
        match result {
            Ok(()) => stats.record_success(bytes),
            Err(err) => stats.record_failure(err),
        }
    }
}

#[async_trait::async_trait]
impl SnapshotStore for JsonLinesStore {
    async fn write(&self, snapshot: &SubjectSnapshot) -> Result<(), ConnectorError> {
        let mut line = serde_json::to_vec(snapshot)?;
        line.push(b'\n');

        let result = self.append(&line).await;
        self.record(&result, line.len());
        result
    }

    async fn flush(&self) -> Result<(), ConnectorError> {
        let mut guard = self.file.lock().await;
        if let Some(file) = guard.as_mut() {
            file.flush().await?;
            file.sync_data().await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn stats(&self) -> ConnectionStats {
        self.stats.lock().clone()
    }
}
