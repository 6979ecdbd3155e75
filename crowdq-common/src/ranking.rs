//! Vote aggregation and play order
//!
//! Each voter holds at most one vote per entry. Casting the same direction
//! twice is rejected; casting the opposite direction reverses the earlier
//! vote. Queued entries are ordered by score descending, then by request
//! time ascending.

use crate::{Entry, Error, Identity, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Vote direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn from_upvote(upvote: bool) -> Self {
        if upvote {
            VoteDirection::Up
        } else {
            VoteDirection::Down
        }
    }

    /// Score contribution (+1 / -1)
    pub fn value(self) -> i64 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }
}

/// Cast `direction` on `entry` on behalf of `voter`
///
/// Returns [`Error::AlreadyVoted`] without touching the entry when the voter's
/// last vote already points the same way.
pub fn cast_vote(entry: &mut Entry, voter: &Identity, direction: VoteDirection) -> Result<()> {
    let prior = entry.vote_of(voter);
    if prior == Some(direction) {
        return Err(Error::AlreadyVoted(format!(
            "{} already voted {:?} on {}",
            voter,
            direction,
            entry.id()
        )));
    }

    let score = entry.score_mut();
    if let Some(prior) = prior {
        *score -= prior.value();
    }
    *score += direction.value();

    entry
        .voter_ledger
        .insert(voter.username().to_string(), direction);
    Ok(())
}

/// Total order over queued entries
pub fn compare(a: &Entry, b: &Entry) -> Ordering {
    b.score()
        .cmp(&a.score())
        .then_with(|| a.requested_at().cmp(&b.requested_at()))
}

/// Sort entries into play order
pub fn sort(entries: &mut [Entry]) {
    entries.sort_by(compare);
}
