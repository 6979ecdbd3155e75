//! REST API
//!
//! Control surface over the queues: submissions, votes, skips, deletions,
//! and read-only status views.

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{create_router, AppContext};
