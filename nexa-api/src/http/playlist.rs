//! Playlist generator endpoints: paging and navigation.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use nexa_core::models::GeneratorId;
use nexa_core::service::{ChunkPayload, NavigatePayload};

use super::error::{AppError, AppResult};
use super::middleware::AuthUser;
use super::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkQuery {
    #[serde(default)]
    pub start_index: i64,
    #[serde(default = "default_chunk_limit")]
    pub limit: i64,
}

fn default_chunk_limit() -> i64 {
    100
}

/// GET /api/playlist/{generator_id}/chunk
pub async fn chunk(
    _auth: AuthUser,
    Path(generator_id): Path<String>,
    Query(query): Query<ChunkQuery>,
    State(state): State<AppState>,
) -> AppResult<Json<ChunkPayload>> {
    let generator_id = GeneratorId::from_string(generator_id);
    let payload = state
        .playlist
        .chunk(&generator_id, query.start_index, query.limit)
        .await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigateDirection {
    Next,
    Previous,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateRequest {
    pub direction: NavigateDirection,
}

/// POST /api/playlist/{generator_id}/navigate
pub async fn navigate(
    _auth: AuthUser,
    Path(generator_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<NavigateRequest>,
) -> AppResult<Json<NavigatePayload>> {
    let generator_id = GeneratorId::from_string(generator_id);
    let forward = matches!(request.direction, NavigateDirection::Next);
    let payload = state.playlist.step(&generator_id, forward).await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JumpRequest {
    pub index: i64,
}

/// POST /api/playlist/{generator_id}/jump
pub async fn jump(
    _auth: AuthUser,
    Path(generator_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<JumpRequest>,
) -> AppResult<Json<NavigatePayload>> {
    let generator_id = GeneratorId::from_string(generator_id);
    let payload = state.playlist.jump(&generator_id, request.index).await?;
    Ok(Json(payload))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeRequest {
    pub shuffle: Option<bool>,
    pub repeat: Option<bool>,
}

/// POST /api/playlist/{generator_id}/mode
pub async fn mode(
    _auth: AuthUser,
    Path(generator_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ModeRequest>,
) -> AppResult<Json<NavigatePayload>> {
    if request.shuffle.is_none() && request.repeat.is_none() {
        return Err(AppError::bad_request("shuffle or repeat is required"));
    }
    let generator_id = GeneratorId::from_string(generator_id);
    let payload = state
        .playlist
        .set_modes(&generator_id, request.shuffle, request.repeat)
        .await?;
    Ok(Json(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_query_defaults() {
        let query: ChunkQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(query.start_index, 0);
        assert_eq!(query.limit, 100);
    }

    #[test]
    fn test_navigate_direction_parse() {
        let request: NavigateRequest =
            serde_json::from_value(serde_json::json!({"direction": "previous"})).unwrap();
        assert!(matches!(request.direction, NavigateDirection::Previous));
    }
}
