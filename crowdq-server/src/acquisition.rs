//! Acquisition queue and worker
//!
//! Submissions are resolved into entries up front (so callers see resolution
//! failures immediately), queued, and then drained by a background worker
//! that makes sure each entry's asset exists locally before handing the
//! entry over to the play queue. Acquisition failures are terminal for the
//! entry: it is logged and dropped, never retried.

use crate::acquirer::MediaAcquirer;
use crate::backoff::IdleBackoff;
use crate::cursor::{Cursor, CursorSnapshot};
use crate::media::MediaStore;
use crate::playback::PlayQueue;
use crate::queue::EntryQueue;
use crate::resolver::{is_valid_url, TrackResolver};
use crowdq_common::{Entry, Error, Identity, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Result of one acquisition step
#[derive(Debug)]
pub enum AcquireOutcome {
    /// Queue was empty
    Idle,
    /// Asset is on disk; entry is ready for playback
    Ready(Entry),
    /// Acquisition failed; entry was dropped
    Dropped { entry: Entry, error: Error },
}

pub struct AcquisitionQueue {
    queue: EntryQueue,
    cursor: Cursor,
    resolver: Arc<dyn TrackResolver>,
    acquirer: Arc<dyn MediaAcquirer>,
    media: MediaStore,
    /// Per-content-hash lock so one asset is never fetched twice at once
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AcquisitionQueue {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        acquirer: Arc<dyn MediaAcquirer>,
        media: MediaStore,
    ) -> Self {
        Self {
            queue: EntryQueue::new(),
            cursor: Cursor::new(),
            resolver,
            acquirer,
            media,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a URL or free-text submission and queue it for acquisition
    pub async fn add(&self, input: &str, requester: &Identity) -> Result<Entry> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::Validation("submission must not be empty".to_string()));
        }

        let (display_name, url) = if is_valid_url(input) {
            let title = self.resolver.title_for_url(input).await?;
            (title, input.to_string())
        } else {
            let track = self.resolver.search(input).await?;
            (track.display_name, track.url)
        };

        let entry = Entry::new(display_name, url, requester);
        info!(
            "Adding {} ({}) for {}: {}",
            entry.display_name(),
            entry.source_url(),
            requester,
            entry.id()
        );
        self.queue.append(entry.clone()).await;
        Ok(entry)
    }

    pub async fn snapshot(&self) -> Vec<Entry> {
        self.queue.snapshot().await
    }

    pub async fn count(&self) -> usize {
        self.queue.count().await
    }

    /// "Now acquiring" slot
    pub async fn now_acquiring(&self) -> CursorSnapshot {
        self.cursor.snapshot().await
    }

    /// Entry being acquired (if any) followed by the waiting entries
    pub async fn listing(&self) -> Vec<Entry> {
        let mut listing: Vec<Entry> = self.cursor.current_entry().await.into_iter().collect();
        listing.extend(self.queue.snapshot().await);
        listing
    }

    /// Take the next entry and make sure its asset is available
    pub async fn acquire_next(&self) -> AcquireOutcome {
        let Some(entry) = self.queue.pop_front().await else {
            return AcquireOutcome::Idle;
        };

        self.cursor.publish(entry.clone()).await;
        debug!("Acquiring {} ({})", entry.display_name(), entry.content_hash());
        let result = self.ensure_asset(&entry).await;
        self.cursor.clear().await;

        match result {
            Ok(()) => AcquireOutcome::Ready(entry),
            Err(error) => AcquireOutcome::Dropped { entry, error },
        }
    }

    async fn ensure_asset(&self, entry: &Entry) -> Result<()> {
        let hash = entry.content_hash();
        let lock = self.hash_lock(hash).await;
        let result = {
            let _guard = lock.lock().await;
            let target = self.media.asset_path(hash);
            if self.media.has_asset(hash).await {
                debug!("Asset {} already present", target.display());
                Ok(())
            } else {
                self.acquirer.acquire(entry.source_url(), &target).await
            }
        };
        self.release_hash_lock(hash, lock).await;
        result
    }

    async fn hash_lock(&self, hash: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.entry(hash.to_string()).or_default().clone()
    }

    async fn release_hash_lock(&self, hash: &str, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // Map + our handle; anyone else waiting holds another clone
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(hash);
        }
    }

    /// Background worker: drain the queue into `play_queue` until shutdown
    pub async fn run(
        self: Arc<Self>,
        play_queue: Arc<PlayQueue>,
        mut backoff: IdleBackoff,
        shutdown: CancellationToken,
    ) {
        info!("Acquisition worker started");
        while !shutdown.is_cancelled() {
            if self.queue.count().await == 0 {
                let idle = backoff.next_idle();
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(idle) => continue,
                }
            }
            backoff.reset();

            match self.acquire_next().await {
                AcquireOutcome::Ready(entry) => {
                    if entry.content_hash().is_empty() {
                        error!("Entry {} has no content hash, dropping", entry.id());
                    } else {
                        play_queue.add(entry).await;
                    }
                }
                AcquireOutcome::Dropped { entry, error } => {
                    error!(
                        "Failed to acquire {} ({}): {}",
                        entry.display_name(),
                        entry.id(),
                        error
                    );
                }
                AcquireOutcome::Idle => {}
            }
        }
        info!("Acquisition worker stopped");
    }
}
