//! DASH manifest, segment, and trickplay endpoints.
//!
//! Manifest requests carry the session (from the plan's playback URL) so
//! the variant can be re-derived; bare segment requests resolve against
//! the job already running for the part.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use nexa_core::models::{MediaPart, MediaPartId, SessionId, StreamPlan};
use nexa_core::service::planner;
use nexa_transcode::build_trickplay_vtt;

use super::error::{AppError, AppResult};
use super::middleware::AuthUser;
use super::state::AppState;

/// Header reporting the true media offset of the first served segment.
pub const DASH_START_TIME_HEADER: &str = "X-Dash-Start-Time-Ms";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestQuery {
    #[serde(default)]
    pub seek_ms: u64,
    pub session_id: Option<SessionId>,
}

/// GET /stream/part/{part_id}/dash/manifest.mpd
pub async fn manifest(
    _auth: AuthUser,
    Path(part_id): Path<String>,
    Query(query): Query<ManifestQuery>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let session_id = query
        .session_id
        .ok_or_else(|| AppError::bad_request("sessionId is required"))?;
    let part_id = MediaPartId::from_string(part_id);
    let (part, plan) = plan_for_part(&state, &part_id, &session_id).await?;

    if !plan.requires_transcode_job() {
        return Err(AppError::bad_request(
            "plan does not use segmented delivery",
        ));
    }

    let manifest = state
        .transcode
        .manifest(&part, &plan, &session_id, query.seek_ms)
        .await?;

    let mut response = file_response(&manifest.path, manifest.content_type).await?;
    if query.seek_ms > 0 {
        response.headers_mut().insert(
            DASH_START_TIME_HEADER,
            header::HeaderValue::from_str(&manifest.start_time_ms.to_string())
                .map_err(|e| AppError::internal_server_error(e.to_string()))?,
        );
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentQuery {
    pub session_id: Option<SessionId>,
}

/// GET /stream/part/{part_id}/dash/{file_name}
pub async fn segment(
    _auth: AuthUser,
    Path((part_id, file_name)): Path<(String, String)>,
    Query(query): Query<SegmentQuery>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let part_id = MediaPartId::from_string(part_id);

    let served = match query.session_id {
        Some(session_id) => {
            let (part, plan) = plan_for_part(&state, &part_id, &session_id).await?;
            state
                .transcode
                .segment(&part, &plan, &session_id, &file_name)
                .await?
        }
        None => state.transcode.segment_for_part(&part_id, &file_name).await?,
    };

    let mut response = file_response(&served.path, served.content_type).await?;
    if let Some(start_time_ms) = served.start_time_ms {
        response.headers_mut().insert(
            DASH_START_TIME_HEADER,
            header::HeaderValue::from_str(&start_time_ms.to_string())
                .map_err(|e| AppError::internal_server_error(e.to_string()))?,
        );
    }
    Ok(response)
}

/// GET /stream/part/{part_id}/trickplay.vtt
pub async fn trickplay(
    _auth: AuthUser,
    Path(part_id): Path<String>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let part_id = MediaPartId::from_string(part_id);
    let part = state
        .catalog
        .part(&part_id)
        .await?
        .ok_or_else(|| AppError::not_found("Media part not found"))?;
    let facts = state
        .catalog
        .source_facts(&part.item_id)
        .await?
        .ok_or_else(|| AppError::not_found("Media source not found"))?;
    let trickplay = facts
        .trickplay
        .as_ref()
        .ok_or_else(|| AppError::not_found("No trickplay track for part"))?;

    let vtt = build_trickplay_vtt(trickplay, part.duration_ms);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/vtt")
        .body(Body::from(vtt))
        .map_err(|e| AppError::internal_server_error(e.to_string()))
}

/// Re-derive the plan a session's capability produces for a part's item.
pub async fn plan_for_part(
    state: &AppState,
    part_id: &MediaPartId,
    session_id: &SessionId,
) -> AppResult<(MediaPart, StreamPlan)> {
    let part = state
        .catalog
        .part(part_id)
        .await?
        .ok_or_else(|| AppError::not_found("Media part not found"))?;
    let facts = state
        .catalog
        .source_facts(&part.item_id)
        .await?
        .ok_or_else(|| AppError::not_found("Media source not found"))?;
    let effective = state.capabilities.effective(session_id).await?;
    let plan = planner::plan(&facts, &effective.capabilities, &state.policy, None)?;
    Ok((part, plan))
}

/// Stream a file from the job directory.
async fn file_response(path: &std::path::Path, content_type: &'static str) -> AppResult<Response> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|_| AppError::not_found("Segment not found"))?;
    let stream = ReaderStream::new(file);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::internal_server_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_query_parses_seek() {
        let query: ManifestQuery = serde_json::from_value(serde_json::json!({
            "seekMs": 12000,
            "sessionId": "sess00000001"
        }))
        .unwrap();
        assert_eq!(query.seek_ms, 12_000);
        assert!(query.session_id.is_some());

        let query: ManifestQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(query.seek_ms, 0);
    }
}
