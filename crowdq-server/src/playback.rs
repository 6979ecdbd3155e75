//! Play queue and playback worker
//!
//! Entries arrive here only after their asset is on disk. The worker pops
//! the top-ranked entry, hands the asset to the audio output, publishes the
//! position once per second, and records the entry in the history when the
//! playback ends, whether it ran out naturally or was skipped.
//!
//! Each playback gets a fresh [`CancellationToken`]. The output cancels it at
//! end of stream; [`PlayQueue::skip`] cancels it early. Both paths end in the
//! same cleanup.

use crate::audio::{Asset, AudioOutput};
use crate::backoff::IdleBackoff;
use crate::cursor::{Cursor, CursorSnapshot};
use crate::history::HistoryLog;
use crate::media::MediaStore;
use crate::queue::EntryQueue;
use chrono::Utc;
use crowdq_common::{ranking, Entry, EntryId, Error, Identity, Result, VoteDirection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Position publishing interval
pub const POSITION_TICK: Duration = Duration::from_secs(1);

/// Result of one playback step
#[derive(Debug)]
pub enum PlayOutcome {
    /// Queue was empty
    Idle,
    /// Playback ended (naturally or skipped); entry carries `played_at`
    Played(Entry),
    /// Asset could not be opened or decoded; entry was dropped
    Dropped { entry: Entry, error: Error },
}

pub struct PlayQueue {
    queue: EntryQueue,
    cursor: Cursor,
    output: Arc<dyn AudioOutput>,
    history: Arc<HistoryLog>,
    media: MediaStore,
    /// Cancellation token of the playback in progress
    active: Mutex<Option<CancellationToken>>,
    tick: Duration,
}

impl PlayQueue {
    pub fn new(output: Arc<dyn AudioOutput>, history: Arc<HistoryLog>, media: MediaStore) -> Self {
        Self {
            queue: EntryQueue::new(),
            cursor: Cursor::new(),
            output,
            history,
            media,
            active: Mutex::new(None),
            tick: POSITION_TICK,
        }
    }

    /// Override the position publishing interval
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Append an acquired entry (keeps arrival position until the next vote)
    pub async fn add(&self, entry: Entry) {
        debug!("Queued {} for playback", entry.id());
        self.queue.append(entry).await;
    }

    pub async fn snapshot(&self) -> Vec<Entry> {
        self.queue.snapshot().await
    }

    pub async fn count(&self) -> usize {
        self.queue.count().await
    }

    /// "Now playing" slot
    pub async fn now_playing(&self) -> CursorSnapshot {
        self.cursor.snapshot().await
    }

    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    /// Cast a vote and re-rank the queue
    ///
    /// Lookup, vote, and re-sort happen under one lock acquisition.
    pub async fn vote_song(&self, id: EntryId, upvote: bool, voter: &Identity) -> Result<()> {
        let direction = VoteDirection::from_upvote(upvote);
        self.queue
            .with_entries(|entries| -> Result<()> {
                let entry = entries
                    .iter_mut()
                    .find(|e| e.id() == id)
                    .ok_or_else(|| Error::NotFound(format!("entry {}", id)))?;
                ranking::cast_vote(entry, voter, direction)?;
                info!("{} voted {:?} on {} (score {})", voter, direction, id, entry.score());
                ranking::sort(entries);
                Ok(())
            })
            .await
    }

    /// Remove a queued entry
    pub async fn delete_song(&self, id: EntryId) -> Result<()> {
        let removed = self.queue.remove_by_id(id).await?;
        info!("Deleted {} ({}) from play queue", removed.display_name(), id);
        Ok(())
    }

    /// Cancel the playback in progress
    ///
    /// Returns false when nothing is playing.
    pub async fn skip(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(token) => {
                info!("Skipping current entry");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Play the top-ranked entry to completion or cancellation
    ///
    /// `shutdown` cancels the playback as well. The entry becomes skippable
    /// the moment it shows up as "now playing".
    pub async fn play_next(&self, shutdown: &CancellationToken) -> PlayOutcome {
        let Some(mut entry) = self.queue.pop_front().await else {
            return PlayOutcome::Idle;
        };

        let done = shutdown.child_token();
        *self.active.lock().await = Some(done.clone());
        self.cursor.publish(entry.clone()).await;
        info!("Playing {} ({})", entry.display_name(), entry.content_hash());

        let result = self.play_entry(&entry, done).await;
        self.active.lock().await.take();
        self.cursor.clear().await;

        if let Err(error) = result {
            return PlayOutcome::Dropped { entry, error };
        }

        entry.mark_played(Utc::now());
        if let Err(e) = self.history.append(&entry).await {
            warn!("Failed to record {} in history: {}", entry.id(), e);
        }
        info!("Played {}", entry.display_name());
        PlayOutcome::Played(entry)
    }

    async fn play_entry(&self, entry: &Entry, done: CancellationToken) -> Result<()> {
        let path = self.media.asset_path(entry.content_hash());
        let file = tokio::fs::File::open(&path).await?.into_std().await;

        if done.is_cancelled() {
            debug!("{} skipped before output started", entry.id());
            return Ok(());
        }
        let control = self.output.play(Asset { path, file }, done.clone()).await?;

        let mut ticker = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = ticker.tick() => {
                    self.cursor.set_progress(control.position(), control.length()).await;
                }
            }
        }

        match control.failure() {
            Some(reason) => Err(Error::Playback(reason)),
            None => Ok(()),
        }
    }

    /// Background worker: play entries until shutdown
    pub async fn run(self: Arc<Self>, mut backoff: IdleBackoff, shutdown: CancellationToken) {
        info!("Playback worker started");
        while !shutdown.is_cancelled() {
            if self.queue.count().await == 0 {
                let idle = backoff.next_idle();
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(idle) => continue,
                }
            }
            backoff.reset();

            if let PlayOutcome::Dropped { entry, error } = self.play_next(&shutdown).await {
                error!(
                    "Failed to play {} ({}): {}",
                    entry.display_name(),
                    entry.id(),
                    error
                );
            }
        }
        info!("Playback worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{silent_mp3, PlaybackControl, ProcessOutput};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Output that ends on its own after `length`, unless cancelled first
    struct FakeOutput {
        length: Duration,
        started: AtomicUsize,
        started_at: std::sync::Mutex<Vec<tokio::time::Instant>>,
        start_delay: Duration,
    }

    impl FakeOutput {
        fn new(length: Duration) -> Self {
            Self {
                length,
                started: AtomicUsize::new(0),
                started_at: std::sync::Mutex::new(Vec::new()),
                start_delay: Duration::ZERO,
            }
        }
    }

    struct FakeControl {
        length: Duration,
    }

    impl PlaybackControl for FakeControl {
        fn position(&self) -> Duration {
            Duration::from_millis(250)
        }

        fn length(&self) -> Duration {
            self.length
        }
    }

    #[async_trait]
    impl AudioOutput for FakeOutput {
        async fn play(
            &self,
            _asset: Asset,
            done: CancellationToken,
        ) -> Result<Arc<dyn PlaybackControl>> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.started_at.lock().unwrap().push(tokio::time::Instant::now());
            tokio::time::sleep(self.start_delay).await;
            let length = self.length;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(length) => done.cancel(),
                    _ = done.cancelled() => {}
                }
            });
            Ok(Arc::new(FakeControl { length }))
        }
    }

    struct Fixture {
        queue: Arc<PlayQueue>,
        output: Arc<FakeOutput>,
        media: MediaStore,
        _dir: tempfile::TempDir,
    }

    fn fixture(length: Duration) -> Fixture {
        fixture_with(FakeOutput::new(length))
    }

    fn fixture_with(output: FakeOutput) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());
        let output = Arc::new(output);
        let history = Arc::new(HistoryLog::new(media.history_path()));
        let queue = Arc::new(
            PlayQueue::new(output.clone(), history, media.clone())
                .with_tick(Duration::from_millis(20)),
        );
        Fixture {
            queue,
            output,
            media,
            _dir: dir,
        }
    }

    fn voter(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    fn entry_at(name: &str, offset_secs: i64) -> Entry {
        Entry::with_requested_at(
            name,
            format!("https://x/{}", name),
            &voter("requester"),
            Utc::now() + ChronoDuration::seconds(offset_secs),
        )
    }

    async fn with_asset(media: &MediaStore, entry: &Entry) {
        tokio::fs::write(media.asset_path(entry.content_hash()), b"audio")
            .await
            .unwrap();
    }

    async fn names(queue: &PlayQueue) -> Vec<String> {
        queue
            .snapshot()
            .await
            .iter()
            .map(|e| e.display_name().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_add_keeps_arrival_order() {
        let f = fixture(Duration::from_millis(10));
        f.queue.add(entry_at("A", 0)).await;
        f.queue.add(entry_at("B", 1)).await;
        f.queue.add(entry_at("C", 2)).await;
        assert_eq!(names(&f.queue).await, ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_upvote_reranks() {
        let f = fixture(Duration::from_millis(10));
        let c = entry_at("C", 2);
        let c_id = c.id();
        f.queue.add(entry_at("A", 0)).await;
        f.queue.add(entry_at("B", 1)).await;
        f.queue.add(c).await;

        f.queue.vote_song(c_id, true, &voter("v")).await.unwrap();
        assert_eq!(names(&f.queue).await, ["C", "A", "B"]);
    }

    #[tokio::test]
    async fn test_repeat_vote_rejected_and_reversal_applies() {
        let f = fixture(Duration::from_millis(10));
        let a = entry_at("A", 0);
        let a_id = a.id();
        f.queue.add(a).await;
        f.queue.add(entry_at("B", 1)).await;

        f.queue.vote_song(a_id, true, &voter("v")).await.unwrap();
        let err = f.queue.vote_song(a_id, true, &voter("v")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyVoted(_)));
        assert_eq!(f.queue.snapshot().await[0].score(), 1);

        f.queue.vote_song(a_id, false, &voter("v")).await.unwrap();
        assert_eq!(names(&f.queue).await, ["B", "A"]);
        assert_eq!(f.queue.snapshot().await[1].score(), -1);
    }

    #[tokio::test]
    async fn test_unknown_id_leaves_queue_unchanged() {
        let f = fixture(Duration::from_millis(10));
        f.queue.add(entry_at("A", 0)).await;
        f.queue.add(entry_at("B", 1)).await;
        let before = f.queue.snapshot().await;

        let missing = Uuid::new_v4();
        assert!(matches!(
            f.queue.vote_song(missing, true, &voter("v")).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(f.queue.delete_song(missing).await, Err(Error::NotFound(_))));
        assert_eq!(f.queue.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_delete_song() {
        let f = fixture(Duration::from_millis(10));
        let a = entry_at("A", 0);
        let a_id = a.id();
        f.queue.add(a).await;
        f.queue.add(entry_at("B", 1)).await;

        f.queue.delete_song(a_id).await.unwrap();
        assert_eq!(names(&f.queue).await, ["B"]);
    }

    #[tokio::test]
    async fn test_skip_when_idle_is_noop() {
        let f = fixture(Duration::from_millis(10));
        assert!(!f.queue.skip().await);
    }

    #[tokio::test]
    async fn test_play_next_empty_is_idle() {
        let f = fixture(Duration::from_millis(10));
        let outcome = f.queue.play_next(&CancellationToken::new()).await;
        assert!(matches!(outcome, PlayOutcome::Idle));
    }

    #[tokio::test]
    async fn test_natural_end_records_history() {
        let f = fixture(Duration::from_millis(80));
        let a = entry_at("A", 0);
        with_asset(&f.media, &a).await;
        f.queue.add(a.clone()).await;

        let before = Utc::now();
        let outcome = f.queue.play_next(&CancellationToken::new()).await;
        let played = match outcome {
            PlayOutcome::Played(entry) => entry,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(played.id(), a.id());
        assert!(played.played_at().unwrap() >= before);

        let history = f.queue.history().read_all().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id(), a.id());
        assert!(f.queue.now_playing().await.is_idle());
    }

    #[tokio::test]
    async fn test_missing_asset_dropped_without_history() {
        let f = fixture(Duration::from_millis(10));
        f.queue.add(entry_at("A", 0)).await;

        let outcome = f.queue.play_next(&CancellationToken::new()).await;
        match outcome {
            PlayOutcome::Dropped { error, .. } => assert!(matches!(error, Error::Io(_))),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(f.output.started.load(Ordering::SeqCst), 0);
        assert_eq!(f.queue.count().await, 0);
        assert!(f.queue.history().read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skip_ends_playback_and_publishes_progress() {
        let f = fixture(Duration::from_secs(60));
        let a = entry_at("A", 0);
        with_asset(&f.media, &a).await;
        f.queue.add(a.clone()).await;

        let player = {
            let queue = f.queue.clone();
            tokio::spawn(async move { queue.play_next(&CancellationToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let now = f.queue.now_playing().await;
        assert_eq!(now.entry.map(|e| e.id()), Some(a.id()));
        assert_eq!(now.position_ms, 250);
        assert_eq!(now.length_ms, 60_000);

        let skipped_at = Utc::now();
        assert!(f.queue.skip().await);
        let outcome = tokio::time::timeout(Duration::from_secs(5), player)
            .await
            .expect("playback did not stop after skip")
            .unwrap();
        match outcome {
            PlayOutcome::Played(entry) => assert!(entry.played_at().unwrap() >= skipped_at),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!f.queue.skip().await);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_playback() {
        let f = fixture(Duration::from_secs(60));
        let a = entry_at("A", 0);
        with_asset(&f.media, &a).await;
        f.queue.add(a).await;

        let shutdown = CancellationToken::new();
        let player = {
            let queue = f.queue.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { queue.play_next(&shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), player)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, PlayOutcome::Played(_)));
    }

    #[tokio::test]
    async fn test_worker_plays_in_rank_order() {
        let f = fixture(Duration::from_millis(30));
        let a = entry_at("A", 0);
        let b = entry_at("B", 1);
        with_asset(&f.media, &a).await;
        with_asset(&f.media, &b).await;
        f.queue.add(a.clone()).await;
        f.queue.add(b.clone()).await;
        f.queue.vote_song(b.id(), true, &voter("v")).await.unwrap();

        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(f.queue.clone().run(
            IdleBackoff::new(
                Duration::from_millis(10),
                Duration::from_millis(10),
                Duration::from_millis(50),
            ),
            shutdown.clone(),
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while f.queue.history().read_all().await.unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker did not play both entries");

        shutdown.cancel();
        worker.await.unwrap();

        let history = f.queue.history().read_all().await.unwrap();
        assert_eq!(history[0].id(), b.id());
        assert_eq!(history[1].id(), a.id());
    }

    #[tokio::test]
    async fn test_skip_available_once_entry_is_published() {
        let f = fixture_with(FakeOutput {
            start_delay: Duration::from_millis(200),
            ..FakeOutput::new(Duration::from_secs(60))
        });
        let a = entry_at("A", 0);
        with_asset(&f.media, &a).await;
        f.queue.add(a.clone()).await;

        let player = {
            let queue = f.queue.clone();
            tokio::spawn(async move { queue.play_next(&CancellationToken::new()).await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while f.queue.now_playing().await.is_idle() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(f.queue.skip().await);
        let outcome = tokio::time::timeout(Duration::from_secs(5), player)
            .await
            .expect("playback did not stop after skip")
            .unwrap();
        assert!(matches!(outcome, PlayOutcome::Played(_)));
    }

    fn process_fixture(program: &str) -> (Arc<PlayQueue>, MediaStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(dir.path());
        let output = Arc::new(ProcessOutput::new(vec![program.to_string()]).unwrap());
        let history = Arc::new(HistoryLog::new(media.history_path()));
        let queue = Arc::new(PlayQueue::new(output, history, media.clone()));
        (queue, media, dir)
    }

    async fn with_silent_asset(media: &MediaStore, entry: &Entry) {
        tokio::fs::write(
            media.asset_path(entry.content_hash()),
            silent_mp3(20),
        )
        .await
        .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_player_drops_entry() {
        let (queue, media, _dir) = process_fixture("false");
        let a = entry_at("A", 0);
        with_silent_asset(&media, &a).await;
        queue.add(a).await;

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            queue.play_next(&CancellationToken::new()),
        )
        .await
        .unwrap();
        match outcome {
            PlayOutcome::Dropped { error, .. } => assert!(matches!(error, Error::Playback(_))),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(queue.history().read_all().await.unwrap().is_empty());
        assert!(queue.now_playing().await.is_idle());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_player_exit_records_history() {
        let (queue, media, _dir) = process_fixture("true");
        let a = entry_at("A", 0);
        with_silent_asset(&media, &a).await;
        queue.add(a.clone()).await;

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            queue.play_next(&CancellationToken::new()),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, PlayOutcome::Played(_)));
        assert_eq!(queue.history().read_all().await.unwrap()[0].id(), a.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_backoff_grows_then_resets_on_work() {
        let f = fixture(Duration::from_millis(10));
        let a = entry_at("A", 0);
        let b = entry_at("B", 1);
        with_asset(&f.media, &a).await;
        with_asset(&f.media, &b).await;

        let start = tokio::time::Instant::now();
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(f.queue.clone().run(
            IdleBackoff::new(
                Duration::from_millis(100),
                Duration::from_millis(100),
                Duration::from_millis(300),
            ),
            shutdown.clone(),
        ));

        // Idle checks at 0, 100, 300, 600, 900 ms
        tokio::time::sleep_until(start + Duration::from_millis(650)).await;
        f.queue.add(a).await;
        // Played at 900 and done at 910; the next idle sleep is back to 100 ms
        tokio::time::sleep_until(start + Duration::from_millis(950)).await;
        f.queue.add(b).await;

        tokio::time::sleep_until(start + Duration::from_millis(1100)).await;
        shutdown.cancel();
        worker.await.unwrap();

        let offsets: Vec<u128> = f
            .output
            .started_at
            .lock()
            .unwrap()
            .iter()
            .map(|t| (*t - start).as_millis())
            .collect();
        assert_eq!(offsets.len(), 2);
        assert!((900..920).contains(&offsets[0]), "first start at {:?}", offsets);
        assert!((1010..1030).contains(&offsets[1]), "second start at {:?}", offsets);
    }
}
