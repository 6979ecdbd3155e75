//! Queue primitive
//!
//! Ordered, lock-guarded sequence of entries shared by the acquisition queue
//! and the play queue. Every operation holds the lock for its full duration
//! and never awaits anything else while holding it; reads hand out copies.

use crowdq_common::{Entry, EntryId, Error, Result};
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::debug;

/// Thread-safe ordered list of entries
#[derive(Debug, Default)]
pub struct EntryQueue {
    entries: Mutex<VecDeque<Entry>>,
}

impl EntryQueue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entry at the back
    pub async fn append(&self, entry: Entry) {
        let mut entries = self.entries.lock().await;
        debug!("Appending {} at position {}", entry.id(), entries.len());
        entries.push_back(entry);
    }

    /// Remove and return the front entry, or None when empty
    pub async fn pop_front(&self) -> Option<Entry> {
        self.entries.lock().await.pop_front()
    }

    /// Remove the first entry with the given id
    pub async fn remove_by_id(&self, id: EntryId) -> Result<Entry> {
        let mut entries = self.entries.lock().await;
        let index = entries
            .iter()
            .position(|e| e.id() == id)
            .ok_or_else(|| Error::NotFound(format!("entry {}", id)))?;
        // Index was just found under the same lock
        let removed = entries.remove(index);
        removed.ok_or_else(|| Error::NotFound(format!("entry {}", id)))
    }

    /// Number of queued entries
    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Copy of the current order
    pub async fn snapshot(&self) -> Vec<Entry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    /// Run `f` with exclusive access to the sequence
    ///
    /// Used for compound edits (find + mutate + reorder) that must appear
    /// atomic to concurrent readers. `f` must not block.
    pub(crate) async fn with_entries<R>(&self, f: impl FnOnce(&mut [Entry]) -> R) -> R {
        let mut entries = self.entries.lock().await;
        f(entries.make_contiguous())
    }
}
