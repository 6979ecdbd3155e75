//! Common error types for crowdq

use thiserror::Error;

/// Common result type for crowdq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the queue engine and its surrounding layers
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed submission (no side effect)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Title resolution for a URL submission failed
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// Free-text search failed (transport, API, missing credentials)
    #[error("Search error: {0}")]
    Search(String),

    /// Free-text search returned zero results
    #[error("No results found for {0:?}")]
    NoResults(String),

    /// Requested entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Voter already cast this direction on the entry
    #[error("Already voted: {0}")]
    AlreadyVoted(String),

    /// Media acquisition failed
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// Audio output failed
    #[error("Playback error: {0}")]
    Playback(String),

    /// Audio asset could not be probed or decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
