//! Subtitle sidecar and segmented-delivery endpoints.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use serde::Deserialize;

use nexa_core::models::MediaPartId;

use super::error::{AppError, AppResult};
use super::middleware::AuthUser;
use super::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleQuery {
    pub start_position_ticks: Option<u64>,
    pub end_position_ticks: Option<u64>,
    #[serde(default)]
    pub add_vtt_time_map: bool,
    #[serde(default = "default_segment_length")]
    pub segment_length: u64,
}

fn default_segment_length() -> u64 {
    60
}

/// GET /stream/subtitle/part/{part_id}/stream/{stream_index}/{file_name}
///
/// `stream.{vtt|srt|ass}` delivers the (optionally windowed) track;
/// `playlist.m3u8` delivers the VOD playlist over its segments.
pub async fn subtitle(
    _auth: AuthUser,
    Path((part_id, stream_index, file_name)): Path<(String, u32, String)>,
    Query(query): Query<SubtitleQuery>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let part_id = MediaPartId::from_string(part_id);
    let part = state
        .catalog
        .part(&part_id)
        .await?
        .ok_or_else(|| AppError::not_found("Media part not found"))?;

    match file_name.as_str() {
        "playlist.m3u8" => {
            let playlist = state
                .subtitles
                .playlist(&part, stream_index, query.segment_length)
                .await?;
            text_response(playlist, "application/vnd.apple.mpegurl")
        }
        name => {
            let Some(format) = name.strip_prefix("stream.") else {
                return Err(AppError::not_found("Unknown subtitle resource"));
            };
            let body = state
                .subtitles
                .subtitle(
                    &part,
                    stream_index,
                    format,
                    query.start_position_ticks,
                    query.end_position_ticks,
                    query.add_vtt_time_map,
                )
                .await?;
            text_response(body, subtitle_content_type(format))
        }
    }
}

fn subtitle_content_type(format: &str) -> &'static str {
    match format {
        "vtt" => "text/vtt",
        "srt" => "application/x-subrip",
        "ass" => "text/x-ssa",
        _ => "text/plain",
    }
}

fn text_response(body: String, content_type: &'static str) -> AppResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .map_err(|e| AppError::internal_server_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults() {
        let query: SubtitleQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(query.segment_length, 60);
        assert!(!query.add_vtt_time_map);
        assert!(query.start_position_ticks.is_none());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(subtitle_content_type("vtt"), "text/vtt");
        assert_eq!(subtitle_content_type("srt"), "application/x-subrip");
        assert_eq!(subtitle_content_type("ass"), "text/x-ssa");
    }
}
