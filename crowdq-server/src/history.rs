//! Play history
//!
//! Durable, ordered record of played entries: one JSON array file rewritten
//! wholesale on every append. Appends are serialized so concurrent writers
//! cannot drop each other's records.

use crowdq_common::{Entry, Result};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

pub struct HistoryLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All played entries in play order (empty if nothing was recorded yet)
    pub async fn read_all(&self) -> Result<Vec<Entry>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append one played entry
    pub async fn append(&self, entry: &Entry) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut history = self.read_all().await?;
        history.push(entry.clone());

        let json = serde_json::to_vec_pretty(&history)?;
        // Write next to the target, then rename, so readers never see a torn file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            "Recorded {} in history ({} entries)",
            entry.id(),
            history.len()
        );
        Ok(())
    }
}
