//! # crowdq Common Library
//!
//! Shared code for the crowdq services including:
//! - Queue entry model (Entry, Identity, content hash)
//! - Vote casting and ranking order
//! - Configuration loading
//! - Error taxonomy

pub mod config;
pub mod entry;
pub mod error;
pub mod ranking;

pub use entry::{content_hash, Entry, EntryId, Identity};
pub use error::{Error, Result};
pub use ranking::VoteDirection;
