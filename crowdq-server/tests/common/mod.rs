//! Shared test fixtures: in-process fakes for the external collaborators

#![allow(dead_code)]

use async_trait::async_trait;
use crowdq_common::config::{IdleBackoffConfig, Mode};
use crowdq_common::{Error, Result};
use crowdq_server::acquirer::MediaAcquirer;
use crowdq_server::app::Collaborators;
use crowdq_server::audio::{Asset, AudioOutput, PlaybackControl};
use crowdq_server::media::MediaStore;
use crowdq_server::resolver::{ResolvedTrack, TrackResolver};
use crowdq_server::App;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// URL titles are derived from the URL; "nothing" finds nothing
pub struct FakeResolver;

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn title_for_url(&self, url: &str) -> Result<String> {
        Ok(format!("Title of {}", url))
    }

    async fn search(&self, query: &str) -> Result<ResolvedTrack> {
        if query == "nothing" {
            return Err(Error::NoResults(query.to_string()));
        }
        Ok(ResolvedTrack {
            display_name: query.to_string(),
            url: format!("https://www.youtube.com/watch?v={}", query.replace(' ', "_")),
        })
    }
}

/// Writes a placeholder file at the target and counts calls
#[derive(Default)]
pub struct FakeAcquirer {
    calls: AtomicUsize,
}

impl FakeAcquirer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaAcquirer for FakeAcquirer {
    async fn acquire(&self, _url: &str, target: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(target, b"audio").await?;
        Ok(())
    }
}

/// The n-th playback lasts `lengths[n]` (last value repeats) unless cancelled
pub struct FakeOutput {
    lengths: Vec<Duration>,
    plays: AtomicUsize,
}

impl FakeOutput {
    pub fn new(lengths: Vec<Duration>) -> Self {
        assert!(!lengths.is_empty());
        Self {
            lengths,
            plays: AtomicUsize::new(0),
        }
    }

    fn next_length(&self) -> Duration {
        let n = self.plays.fetch_add(1, Ordering::SeqCst);
        self.lengths[n.min(self.lengths.len() - 1)]
    }
}

struct FakeControl {
    started: Instant,
    length: Duration,
}

impl PlaybackControl for FakeControl {
    fn position(&self) -> Duration {
        self.started.elapsed().min(self.length)
    }

    fn length(&self) -> Duration {
        self.length
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn play(&self, _asset: Asset, done: CancellationToken) -> Result<Arc<dyn PlaybackControl>> {
        let length = self.next_length();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(length) => done.cancel(),
                _ = done.cancelled() => {}
            }
        });
        Ok(Arc::new(FakeControl {
            started: Instant::now(),
            length,
        }))
    }
}

pub struct TestApp {
    pub app: App,
    pub acquirer: Arc<FakeAcquirer>,
    pub media: MediaStore,
    _dir: tempfile::TempDir,
}

pub fn fast_backoff() -> IdleBackoffConfig {
    IdleBackoffConfig {
        floor_ms: 10,
        step_ms: 10,
        ceiling_ms: 50,
    }
}

pub fn test_app(mode: Mode, play_length: Duration) -> TestApp {
    test_app_with_lengths(mode, vec![play_length])
}

pub fn test_app_with_lengths(mode: Mode, play_lengths: Vec<Duration>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let media = MediaStore::new(dir.path());
    let acquirer = Arc::new(FakeAcquirer::default());
    let app = App::new(
        Collaborators {
            resolver: Arc::new(FakeResolver),
            acquirer: acquirer.clone(),
            output: Arc::new(FakeOutput::new(play_lengths)),
        },
        media.clone(),
        mode,
        fast_backoff(),
    );
    TestApp {
        app,
        acquirer,
        media,
        _dir: dir,
    }
}

/// Poll `check` until it holds or the timeout expires
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached before timeout");
}
