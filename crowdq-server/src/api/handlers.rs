//! HTTP request handlers

use crate::api::error::ApiError;
use crate::api::server::AppContext;
use crate::cursor::CursorSnapshot;
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequestParts, Path, State,
    },
    http::{request::Parts, StatusCode},
    Json,
};
use crowdq_common::config::Mode;
use crowdq_common::{Entry, Error, Identity};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Header carrying the requester/voter username
pub const USER_HEADER: &str = "x-crowdq-user";

type ApiResult<T> = std::result::Result<T, ApiError>;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    #[serde(default)]
    queries: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AddResponse {
    added: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    upvote: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    position_ms: u64,
    length_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SkipResponse {
    skipped: bool,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    mode: Mode,
}

// ============================================================================
// Extractors
// ============================================================================

/// Requester identity from the user header
pub struct Requester(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| Error::Validation(format!("missing {} header", USER_HEADER)))?
            .to_str()
            .map_err(|_| Error::Validation(format!("{} header is not valid text", USER_HEADER)))?;
        Ok(Requester(Identity::new(value)?))
    }
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "crowdq-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Play Queue Endpoints
// ============================================================================

/// GET /api/queue - Play queue in rank order
pub async fn get_queue(State(ctx): State<AppContext>) -> Json<Vec<Entry>> {
    Json(ctx.app.playback.snapshot().await)
}

/// POST /api/queue - Submit one or more URLs / search queries
///
/// Empty queries are skipped. The first failure aborts the remaining
/// queries; entries added before it stay queued.
pub async fn add_songs(
    State(ctx): State<AppContext>,
    Requester(requester): Requester,
    payload: Result<Json<AddRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AddResponse>)> {
    let Json(request) = payload?;

    let mut added = Vec::new();
    for query in request.queries.iter().filter(|q| !q.trim().is_empty()) {
        added.push(ctx.app.acquisition.add(query, &requester).await?);
    }
    info!("{} added {} entries", requester, added.len());

    Ok((StatusCode::CREATED, Json(AddResponse { added })))
}

/// GET /api/queue/current - Now playing
pub async fn get_current(State(ctx): State<AppContext>) -> Json<CursorSnapshot> {
    Json(ctx.app.playback.now_playing().await)
}

/// GET /api/queue/position - Position of the current playback
pub async fn get_position(State(ctx): State<AppContext>) -> Json<PositionResponse> {
    let now = ctx.app.playback.now_playing().await;
    Json(PositionResponse {
        position_ms: now.position_ms,
        length_ms: now.length_ms,
    })
}

/// POST /api/queue/skip - Skip the current playback
pub async fn skip(State(ctx): State<AppContext>) -> Json<SkipResponse> {
    Json(SkipResponse {
        skipped: ctx.app.playback.skip().await,
    })
}

/// POST /api/queue/:id/vote - Up- or down-vote a queued entry
///
/// Answers 403 in simple mode before looking at the request itself.
pub async fn vote(
    State(ctx): State<AppContext>,
    id: Result<Path<Uuid>, PathRejection>,
    voter: Result<Requester, ApiError>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    if !ctx.app.mode.voting_enabled() {
        return Err(ApiError::forbidden("voting is disabled"));
    }
    let Path(id) = id?;
    let Requester(voter) = voter?;
    let Json(request) = payload?;

    ctx.app.playback.vote_song(id, request.upvote, &voter).await?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

/// DELETE /api/queue/:id - Remove a queued entry
pub async fn delete_song(
    State(ctx): State<AppContext>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Path(id) = id?;
    ctx.app.playback.delete_song(id).await?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

// ============================================================================
// Acquisition Endpoints
// ============================================================================

/// GET /api/acquisition - Entry being acquired followed by waiting entries
pub async fn get_acquisition(State(ctx): State<AppContext>) -> Json<Vec<Entry>> {
    Json(ctx.app.acquisition.listing().await)
}

/// GET /api/acquisition/current - Now acquiring
pub async fn get_acquiring(State(ctx): State<AppContext>) -> Json<CursorSnapshot> {
    Json(ctx.app.acquisition.now_acquiring().await)
}

// ============================================================================
// History / Mode
// ============================================================================

/// GET /api/history - Played entries in play order
pub async fn get_history(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<Entry>>> {
    Ok(Json(ctx.app.history.read_all().await?))
}

/// GET /api/mode
pub async fn get_mode(State(ctx): State<AppContext>) -> Json<ModeResponse> {
    Json(ModeResponse {
        mode: ctx.app.mode,
    })
}
