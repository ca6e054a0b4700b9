//! Playback session RPC endpoints.

use axum::{extract::State, Json};
use serde::Deserialize;

use nexa_core::models::{
    ClientCapabilities, ItemId, MediaPartId, PlaybackState, SeedDescriptor, SeedKind, SessionId,
};
use nexa_core::service::{
    DecidePayload, DecideStatus, HeartbeatPayload, PlaybackResumePayload, PlaybackStartPayload,
    SeekPayload, StartRequest,
};

use super::error::{AppError, AppResult};
use super::middleware::AuthUser;
use super::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPlaybackRequest {
    /// Single-item shorthand; `seed` wins when both are present.
    pub item_id: Option<ItemId>,
    pub seed: Option<SeedDescriptor>,
    pub originator: Option<String>,
    pub context: Option<serde_json::Value>,
    pub capability_version: Option<i32>,
    pub capability: Option<ClientCapabilities>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

/// POST /api/playback/start
pub async fn start_playback(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<StartPlaybackRequest>,
) -> AppResult<Json<PlaybackStartPayload>> {
    let seed = match (request.seed, request.item_id) {
        (Some(seed), _) => seed,
        (None, Some(item_id)) => SeedDescriptor {
            kind: SeedKind::Single { item_id },
            start_index: 0,
            shuffle: false,
            repeat: false,
        },
        (None, None) => {
            return Err(AppError::bad_request("itemId or seed is required"));
        }
    };

    let payload = state
        .playback
        .start(StartRequest {
            user_id: auth.user_id,
            seed,
            capability: request.capability,
            capability_version: request.capability_version,
            device_id: request.device_id,
            device_name: request.device_name,
            originator: request.originator,
            context: request.context,
        })
        .await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePlaybackRequest {
    pub session_id: SessionId,
    pub capability_version: Option<i32>,
    pub capability: Option<ClientCapabilities>,
}

/// POST /api/playback/resume
pub async fn resume_playback(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<ResumePlaybackRequest>,
) -> AppResult<Json<PlaybackResumePayload>> {
    let payload = state
        .playback
        .resume(
            &request.session_id,
            request.capability,
            request.capability_version,
        )
        .await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub session_id: SessionId,
    pub playhead_ms: u64,
    pub state: PlaybackState,
    pub media_part_id: Option<MediaPartId>,
    pub capability_version: Option<i32>,
    pub capability: Option<ClientCapabilities>,
}

/// POST /api/playback/heartbeat
pub async fn heartbeat(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> AppResult<Json<HeartbeatPayload>> {
    let payload = state
        .playback
        .heartbeat(
            &request.session_id,
            request.playhead_ms,
            request.state,
            request.media_part_id,
            request.capability,
            request.capability_version,
        )
        .await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecideRequest {
    pub session_id: SessionId,
    pub status: DecideStatus,
    #[serde(default)]
    pub progress_ms: u64,
    pub jump_index: Option<i64>,
    pub capability_version: Option<i32>,
    pub capability: Option<ClientCapabilities>,
}

/// POST /api/playback/decide
pub async fn decide(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<DecideRequest>,
) -> AppResult<Json<DecidePayload>> {
    let payload = state
        .playback
        .decide(
            &request.session_id,
            request.status,
            request.progress_ms,
            request.jump_index,
            request.capability,
            request.capability_version,
        )
        .await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeekRequest {
    pub session_id: SessionId,
    pub target_ms: u64,
    pub media_part_id: MediaPartId,
}

/// POST /api/playback/seek
pub async fn seek(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<SeekRequest>,
) -> AppResult<Json<SeekPayload>> {
    let payload = state
        .playback
        .seek(&request.session_id, request.target_ms, &request.media_part_id)
        .await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub session_id: SessionId,
}

#[derive(Debug, serde::Serialize)]
pub struct StopResponse {
    pub success: bool,
}

/// POST /api/playback/stop
pub async fn stop(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<StopRequest>,
) -> AppResult<Json<StopResponse>> {
    state.playback.stop(&request.session_id).await?;
    Ok(Json(StopResponse { success: true }))
}
