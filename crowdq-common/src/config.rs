//! Configuration loading
//!
//! Settings come from a TOML file; the binary layers command-line and
//! environment overrides on top (see `crowdq-server`'s `main.rs`).
//!
//! ```toml
//! port = 8080
//! music_dir = "/var/lib/crowdq"
//! youtube_api_key = "..."
//! mode = "voting"
//! player_command = ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"]
//! downloader = "yt-dlp"
//!
//! [idle_backoff]
//! floor_ms = 500
//! step_ms = 500
//! ceiling_ms = 5000
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Plain first-come first-served queue, voting disabled
    Simple,
    /// Crowd voting re-ranks the play queue
    #[default]
    Voting,
}

impl Mode {
    pub fn voting_enabled(self) -> bool {
        matches!(self, Mode::Voting)
    }
}

/// Idle backoff settings shared by both background workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleBackoffConfig {
    pub floor_ms: u64,
    pub step_ms: u64,
    pub ceiling_ms: u64,
}

impl Default for IdleBackoffConfig {
    fn default() -> Self {
        Self {
            floor_ms: 500,
            step_ms: 500,
            ceiling_ms: 5000,
        }
    }
}

impl IdleBackoffConfig {
    pub fn floor(&self) -> Duration {
        Duration::from_millis(self.floor_ms)
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn ceiling(&self) -> Duration {
        Duration::from_millis(self.ceiling_ms)
    }
}

fn default_port() -> u16 {
    8080
}

fn default_player_command() -> Vec<String> {
    ["ffplay", "-nodisp", "-autoexit", "-loglevel", "quiet"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_downloader() -> String {
    "yt-dlp".to_string()
}

/// Service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding content-addressed audio assets and the history file
    #[serde(default)]
    pub music_dir: PathBuf,

    /// YouTube Data API key used for free-text search
    #[serde(default)]
    pub youtube_api_key: Option<String>,

    #[serde(default)]
    pub mode: Mode,

    /// External audio player argv prefix; the asset path is appended
    #[serde(default = "default_player_command")]
    pub player_command: Vec<String>,

    /// yt-dlp binary
    #[serde(default = "default_downloader")]
    pub downloader: String,

    #[serde(default)]
    pub idle_backoff: IdleBackoffConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            music_dir: PathBuf::new(),
            youtube_api_key: None,
            mode: Mode::default(),
            player_command: default_player_command(),
            downloader: default_downloader(),
            idle_backoff: IdleBackoffConfig::default(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.music_dir.as_os_str().is_empty() {
            return Err(Error::Config("music_dir is not set".to_string()));
        }
        let backoff = &self.idle_backoff;
        if backoff.step_ms == 0 {
            return Err(Error::Config("idle_backoff.step_ms must be non-zero".to_string()));
        }
        if backoff.floor_ms > backoff.ceiling_ms {
            return Err(Error::Config(format!(
                "idle_backoff.floor_ms ({}) exceeds ceiling_ms ({})",
                backoff.floor_ms, backoff.ceiling_ms
            )));
        }
        if self.player_command.is_empty() {
            return Err(Error::Config("player_command must not be empty".to_string()));
        }
        Ok(())
    }

    /// Blank API keys count as missing
    pub fn youtube_api_key(&self) -> Option<&str> {
        self.youtube_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}
