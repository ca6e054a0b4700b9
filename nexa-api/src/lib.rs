//! HTTP surface of the Nexa playback core.
//!
//! Explicit axum routes over the playback orchestrator, the playlist
//! generator, the transcode manager's DASH endpoints, and the subtitle and
//! trickplay sidecar generators.

pub mod http;

pub use http::error::{AppError, AppResult};
pub use http::state::{AppState, IdentityValidator, PermissiveValidator};
pub use http::router;
