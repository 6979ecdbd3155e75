//! Queue entry model
//!
//! An [`Entry`] is one track request: created on submission, carried through
//! acquisition and playback, and finally recorded in the play history.
//! Identity fields are fixed at creation; only the vote tally (through
//! [`crate::ranking`]) and the played timestamp change afterwards.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::ranking::VoteDirection;

/// Opaque entry identifier, stable for the entry's lifetime
pub type EntryId = Uuid;

/// Content-addressed asset key for a source URL
///
/// Lowercase hex SHA-1 of the URL bytes. Identical URLs always produce the
/// same key, so entries for the same track share one downloaded asset.
pub fn content_hash(source_url: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(source_url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Requester / voter identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from a username
    ///
    /// Blank usernames are rejected, since they would collapse every
    /// anonymous voter into a single ledger slot.
    pub fn new(username: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let trimmed = username.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("username must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn username(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One queued, playing, or played track request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    id: EntryId,
    display_name: String,
    source_url: String,
    content_hash: String,
    requested_by: String,
    requested_at: DateTime<Utc>,
    #[serde(default)]
    played_at: Option<DateTime<Utc>>,
    #[serde(default)]
    score: i64,
    /// Last vote direction per voter username
    #[serde(skip)]
    pub(crate) voter_ledger: HashMap<String, VoteDirection>,
}

impl Entry {
    /// Create a new entry requested now
    pub fn new(
        display_name: impl Into<String>,
        source_url: impl Into<String>,
        requested_by: &Identity,
    ) -> Self {
        Self::with_requested_at(display_name, source_url, requested_by, Utc::now())
    }

    /// Create a new entry with an explicit request timestamp
    pub fn with_requested_at(
        display_name: impl Into<String>,
        source_url: impl Into<String>,
        requested_by: &Identity,
        requested_at: DateTime<Utc>,
    ) -> Self {
        let source_url = source_url.into();
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            content_hash: content_hash(&source_url),
            source_url,
            requested_by: requested_by.username().to_string(),
            requested_at,
            played_at: None,
            score: 0,
            voter_ledger: HashMap::new(),
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn played_at(&self) -> Option<DateTime<Utc>> {
        self.played_at
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    /// Direction last cast by `voter`, if any
    pub fn vote_of(&self, voter: &Identity) -> Option<VoteDirection> {
        self.voter_ledger.get(voter.username()).copied()
    }

    /// Stamp the moment playback finished
    ///
    /// Only the first call has an effect.
    pub fn mark_played(&mut self, at: DateTime<Utc>) {
        if self.played_at.is_none() {
            self.played_at = Some(at);
        }
    }

    pub(crate) fn score_mut(&mut self) -> &mut i64 {
        &mut self.score
    }
}
