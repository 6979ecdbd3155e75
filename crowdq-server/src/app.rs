//! Application wiring
//!
//! Owns one instance of every component and the shutdown token the
//! background workers observe.

use crate::acquirer::{MediaAcquirer, YtDlpAcquirer};
use crate::acquisition::AcquisitionQueue;
use crate::audio::{AudioOutput, ProcessOutput};
use crate::backoff::IdleBackoff;
use crate::history::HistoryLog;
use crate::media::MediaStore;
use crate::playback::PlayQueue;
use crate::resolver::{TrackResolver, YoutubeResolver};
use crowdq_common::config::{Config, IdleBackoffConfig, Mode};
use crowdq_common::{Error, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Injected collaborators
pub struct Collaborators {
    pub resolver: Arc<dyn TrackResolver>,
    pub acquirer: Arc<dyn MediaAcquirer>,
    pub output: Arc<dyn AudioOutput>,
}

#[derive(Clone)]
pub struct App {
    pub acquisition: Arc<AcquisitionQueue>,
    pub playback: Arc<PlayQueue>,
    pub history: Arc<HistoryLog>,
    pub mode: Mode,
    backoff: IdleBackoffConfig,
    shutdown: CancellationToken,
}

/// Running background workers
pub struct Workers {
    acquisition: JoinHandle<()>,
    playback: JoinHandle<()>,
}

impl Workers {
    /// Wait for both workers to return
    pub async fn join(self) {
        for (name, handle) in [("acquisition", self.acquisition), ("playback", self.playback)] {
            if let Err(e) = handle.await {
                tracing::error!("{} worker panicked: {}", name, e);
            }
        }
    }
}

impl App {
    /// Build the production component graph from configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let media = MediaStore::new(&config.music_dir);
        media.ensure_dir().await.map_err(|e| {
            Error::Config(format!(
                "Failed to create music dir {}: {}",
                media.dir().display(),
                e
            ))
        })?;

        let collaborators = Collaborators {
            resolver: Arc::new(YoutubeResolver::new(
                config.youtube_api_key().map(str::to_string),
                config.downloader.clone(),
            )?),
            acquirer: Arc::new(YtDlpAcquirer::new(config.downloader.clone())),
            output: Arc::new(ProcessOutput::new(config.player_command.clone())?),
        };
        Ok(Self::new(collaborators, media, config.mode, config.idle_backoff))
    }

    pub fn new(
        collaborators: Collaborators,
        media: MediaStore,
        mode: Mode,
        backoff: IdleBackoffConfig,
    ) -> Self {
        let history = Arc::new(HistoryLog::new(media.history_path()));
        let acquisition = Arc::new(AcquisitionQueue::new(
            collaborators.resolver,
            collaborators.acquirer,
            media.clone(),
        ));
        let playback = Arc::new(PlayQueue::new(collaborators.output, history.clone(), media));

        Self {
            acquisition,
            playback,
            history,
            mode,
            backoff,
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the acquisition and playback workers
    pub fn start(&self) -> Workers {
        info!("Starting workers (mode: {:?})", self.mode);
        let acquisition = tokio::spawn(self.acquisition.clone().run(
            self.playback.clone(),
            IdleBackoff::from_config(&self.backoff),
            self.shutdown.clone(),
        ));
        let playback = tokio::spawn(
            self.playback
                .clone()
                .run(IdleBackoff::from_config(&self.backoff), self.shutdown.clone()),
        );
        Workers {
            acquisition,
            playback,
        }
    }

    /// Stop both workers, including any playback in progress
    pub fn shutdown(&self) {
        info!("Shutting down workers");
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
