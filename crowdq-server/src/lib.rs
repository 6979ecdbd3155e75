//! # crowdq Server Library (crowdq-server)
//!
//! Shared playback queue engine with crowd voting.
//!
//! **Purpose:** Accept track requests, acquire the media in the background,
//! rank queued tracks by vote score, play them one at a time, and record the
//! play history.
//!
//! **Architecture:** Two queues (acquisition, play), each drained by its own
//! background worker, glued together by an [`app::App`] that owns every
//! instance. HTTP control lives in [`api`].

pub mod acquirer;
pub mod acquisition;
pub mod api;
pub mod app;
pub mod audio;
pub mod backoff;
pub mod cursor;
pub mod history;
pub mod media;
pub mod playback;
pub mod queue;
pub mod resolver;

pub use app::App;
pub use crowdq_common::{Error, Result};
