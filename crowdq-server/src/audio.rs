//! Audio output
//!
//! The playback worker hands an opened asset to an [`AudioOutput`] together
//! with a completion token. The output cancels the token when the stream is
//! exhausted, and stops producing sound once the token is cancelled by
//! anyone else (skip, shutdown). Whichever side cancels first wins.

use async_trait::async_trait;
use crowdq_common::{Error, Result};
use std::fs::File;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Opened local asset
#[derive(Debug)]
pub struct Asset {
    pub path: PathBuf,
    pub file: File,
}

/// Live view of an in-progress playback
pub trait PlaybackControl: Send + Sync {
    fn position(&self) -> Duration;
    fn length(&self) -> Duration;

    /// Why the output ended on its own without finishing the stream
    ///
    /// Only meaningful once the completion token is cancelled. Stops caused
    /// by an external cancel never report a failure.
    fn failure(&self) -> Option<String> {
        None
    }
}

/// Audio output collaborator
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Begin playing `asset`
    ///
    /// Fails with [`Error::Decode`] when the asset cannot be read as audio,
    /// or [`Error::Playback`] when output cannot start. On success the output
    /// owns `done`: it cancels it at natural end of stream.
    async fn play(&self, asset: Asset, done: CancellationToken) -> Result<Arc<dyn PlaybackControl>>;
}

/// Total length of an encoded stream
///
/// Uses the container's frame count when present, otherwise walks the
/// packets and sums their durations.
pub fn probe_length(asset: Asset) -> Result<Duration> {
    let mss = MediaSourceStream::new(Box::new(asset.file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext_str) = asset.path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext_str);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to probe {}: {}", asset.path.display(), e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

    if let Some(n_frames) = track.codec_params.n_frames {
        return Ok(frames_to_duration(n_frames, sample_rate));
    }

    let mut frames: u64 = 0;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => frames += packet.dur,
            Ok(_) => continue,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(e) => return Err(Error::Decode(format!("Error reading packet: {}", e))),
        }
    }
    Ok(frames_to_duration(frames, sample_rate))
}

fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(frames.saturating_mul(1_000_000) / sample_rate as u64)
}

/// Plays assets through an external player process
///
/// Position is wall-clock time since the player started, clamped to the
/// probed length.
pub struct ProcessOutput {
    command: Vec<String>,
}

impl ProcessOutput {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::Config("player command must not be empty".to_string()));
        }
        Ok(Self { command })
    }
}

struct ProcessPlayback {
    started: Instant,
    length: Duration,
    failure: Arc<OnceLock<String>>,
}

impl PlaybackControl for ProcessPlayback {
    fn position(&self) -> Duration {
        let elapsed = self.started.elapsed();
        if self.length.is_zero() {
            elapsed
        } else {
            elapsed.min(self.length)
        }
    }

    fn length(&self) -> Duration {
        self.length
    }

    fn failure(&self) -> Option<String> {
        self.failure.get().cloned()
    }
}

#[async_trait]
impl AudioOutput for ProcessOutput {
    async fn play(&self, asset: Asset, done: CancellationToken) -> Result<Arc<dyn PlaybackControl>> {
        let path = asset.path.clone();
        let length = tokio::task::spawn_blocking(move || probe_length(asset))
            .await
            .map_err(|e| Error::Decode(format!("Probe task failed: {}", e)))??;
        debug!("Probed {}: {:?}", path.display(), length);

        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Playback(format!("Failed to start {}: {}", self.command[0], e)))?;
        let started = Instant::now();
        let failure = Arc::new(OnceLock::new());

        let exit_failure = failure.clone();
        let program = self.command[0].clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let outcome = match status {
                        Ok(status) if status.success() => Ok(()),
                        Ok(status) => Err(format!("{} exited with {}", program, status)),
                        Err(e) => Err(format!("Failed to wait for {}: {}", program, e)),
                    };
                    match outcome {
                        Ok(()) => debug!("Player finished {}", path.display()),
                        Err(reason) => {
                            warn!("{} ({})", reason, path.display());
                            let _ = exit_failure.set(reason);
                        }
                    }
                    done.cancel();
                }
                _ = done.cancelled() => {
                    info!("Stopping player for {}", path.display());
                    if let Err(e) = child.kill().await {
                        warn!("Failed to stop player: {}", e);
                    }
                }
            }
        });

        Ok(Arc::new(ProcessPlayback {
            started,
            length,
            failure,
        }))
    }
}

/// Silent MPEG-1 Layer III stream for tests (44.1 kHz, 128 kbit/s)
#[cfg(test)]
pub(crate) fn silent_mp3(frames: usize) -> Vec<u8> {
    // 144 * 128000 / 44100, no padding
    const FRAME_LEN: usize = 417;
    let mut data = Vec::with_capacity(frames * FRAME_LEN);
    for _ in 0..frames {
        data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x64]);
        data.resize(data.len() + FRAME_LEN - 4, 0);
    }
    data
}
