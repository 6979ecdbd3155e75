//! Media acquisition
//!
//! Fetches the audio for a URL onto local storage at a caller-chosen path.

use async_trait::async_trait;
use crowdq_common::{Error, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

/// Acquisition collaborator
#[async_trait]
pub trait MediaAcquirer: Send + Sync {
    /// Store the audio behind `url` at `target`
    ///
    /// Fails with [`Error::Acquisition`].
    async fn acquire(&self, url: &str, target: &Path) -> Result<()>;
}

/// yt-dlp based acquirer (audio extracted to mp3)
pub struct YtDlpAcquirer {
    binary: String,
}

impl YtDlpAcquirer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MediaAcquirer for YtDlpAcquirer {
    async fn acquire(&self, url: &str, target: &Path) -> Result<()> {
        info!("Downloading {} to {}", url, target.display());
        let output = Command::new(&self.binary)
            .arg("-x")
            .arg("--audio-format=mp3")
            .arg(url)
            .arg("-o")
            .arg(target)
            .output()
            .await
            .map_err(|e| Error::Acquisition(format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(Error::Acquisition(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!(
            "{} output: {}",
            self.binary,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}
