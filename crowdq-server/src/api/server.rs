//! HTTP server setup and routing

use crate::app::App;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{error, handlers};

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub app: App,
}

/// Build the router with all routes
pub fn create_router(app: App) -> Router {
    let ctx = AppContext { app };

    Router::new()
        // Health endpoint
        .route("/health", get(handlers::health))

        // Play queue
        .route("/api/queue", get(handlers::get_queue).post(handlers::add_songs))
        .route("/api/queue/current", get(handlers::get_current))
        .route("/api/queue/position", get(handlers::get_position))
        .route("/api/queue/skip", post(handlers::skip))
        .route("/api/queue/:id/vote", post(handlers::vote))
        .route("/api/queue/:id", delete(handlers::delete_song))

        // Acquisition
        .route("/api/acquisition", get(handlers::get_acquisition))
        .route("/api/acquisition/current", get(handlers::get_acquiring))

        // History and mode
        .route("/api/history", get(handlers::get_history))
        .route("/api/mode", get(handlers::get_mode))

        // Attach application context
        .with_state(ctx)

        .layer(middleware::from_fn(error::error_body))
        .layer(TraceLayer::new_for_http())

        // Enable CORS for browser clients
        .layer(CorsLayer::permissive())
}
