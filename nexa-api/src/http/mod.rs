//! Route table and shared HTTP plumbing.

pub mod dash;
pub mod error;
pub mod health;
pub mod middleware;
pub mod playback;
pub mod playlist;
pub mod state;
pub mod subtitle;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Playback session RPC
        .route("/api/playback/start", post(playback::start_playback))
        .route("/api/playback/resume", post(playback::resume_playback))
        .route("/api/playback/heartbeat", post(playback::heartbeat))
        .route("/api/playback/decide", post(playback::decide))
        .route("/api/playback/seek", post(playback::seek))
        .route("/api/playback/stop", post(playback::stop))
        // Playlist generators
        .route("/api/playlist/{generator_id}/chunk", get(playlist::chunk))
        .route(
            "/api/playlist/{generator_id}/navigate",
            post(playlist::navigate),
        )
        .route("/api/playlist/{generator_id}/jump", post(playlist::jump))
        .route("/api/playlist/{generator_id}/mode", post(playlist::mode))
        // Segmented delivery
        .route(
            "/stream/part/{part_id}/dash/manifest.mpd",
            get(dash::manifest),
        )
        .route("/stream/part/{part_id}/dash/{file_name}", get(dash::segment))
        .route(
            "/stream/part/{part_id}/hls/main.m3u8",
            get(dash::manifest),
        )
        .route("/stream/part/{part_id}/hls/{file_name}", get(dash::segment))
        .route("/stream/part/{part_id}/trickplay.vtt", get(dash::trickplay))
        // Subtitles
        .route(
            "/stream/subtitle/part/{part_id}/stream/{stream_index}/{file_name}",
            get(subtitle::subtitle),
        )
        // Operational
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
