//! Content-addressed media directory
//!
//! One audio file per distinct content hash: `<music_dir>/<hash>.mp3`.
//! The play history lives next to the assets as `history.json`.

use std::path::{Path, PathBuf};

/// History file name inside the media directory
pub const HISTORY_FILE: &str = "history.json";

const ASSET_EXTENSION: &str = "mp3";

#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if it does not exist
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Asset path for a content hash
    pub fn asset_path(&self, content_hash: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", content_hash, ASSET_EXTENSION))
    }

    /// Whether a regular file already exists for the hash
    pub async fn has_asset(&self, content_hash: &str) -> bool {
        match tokio::fs::metadata(self.asset_path(content_hash)).await {
            Ok(meta) => meta.is_file(),
            Err(_) => false,
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }
}
