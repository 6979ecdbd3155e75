//! Cursor slot
//!
//! The entry a worker currently holds off its queue ("now acquiring" /
//! "now playing") plus live progress. Guarded by its own lock, independent of
//! the queue locks, so status polling never waits on queue edits.

use crowdq_common::Entry;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;

/// Point-in-time copy of a cursor slot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CursorSnapshot {
    /// Entry being processed (None when idle)
    pub entry: Option<Entry>,
    /// Current position in milliseconds
    pub position_ms: u64,
    /// Total length in milliseconds
    pub length_ms: u64,
}

impl CursorSnapshot {
    pub fn is_idle(&self) -> bool {
        self.entry.is_none()
    }
}

/// Single mutable "currently processed" slot
#[derive(Debug, Default)]
pub struct Cursor {
    inner: RwLock<CursorSnapshot>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the entry a worker just took off its queue
    pub async fn publish(&self, entry: Entry) {
        *self.inner.write().await = CursorSnapshot {
            entry: Some(entry),
            position_ms: 0,
            length_ms: 0,
        };
    }

    /// Update live progress
    pub async fn set_progress(&self, position: Duration, length: Duration) {
        let mut inner = self.inner.write().await;
        inner.position_ms = position.as_millis() as u64;
        inner.length_ms = length.as_millis() as u64;
    }

    /// Return to idle
    pub async fn clear(&self) {
        *self.inner.write().await = CursorSnapshot::default();
    }

    pub async fn snapshot(&self) -> CursorSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn current_entry(&self) -> Option<Entry> {
        self.inner.read().await.entry.clone()
    }
}
