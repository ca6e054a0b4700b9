//! Segment filename validation and index parsing.

use std::sync::LazyLock;

use regex::Regex;

use nexa_core::{Error, Result};

/// Shape of a DASH segment filename.
static SEGMENT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(init-|chunk-stream\d+-)\d+\.(m4s|mp4)$").expect("segment name regex")
});

/// Trailing segment index: `-NNNNN` before the extension.
static SEGMENT_INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)(?:\.[^.]+)?$").expect("segment index regex"));

/// Reject path traversal outright; anything else is served from the job
/// directory or falls through the restart logic.
pub fn validate_segment_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(Error::InvalidInput(format!(
            "invalid segment name: {name}"
        )));
    }
    Ok(())
}

/// Whether the name matches the DASH media-segment shape.
#[must_use]
pub fn is_media_segment(name: &str) -> bool {
    SEGMENT_NAME_RE.is_match(name)
}

#[must_use]
pub fn is_init_segment(name: &str) -> bool {
    name.starts_with("init-")
}

/// Parse the trailing segment index. `None` means the file carries no
/// index and is served as-is with no restart logic.
#[must_use]
pub fn parse_segment_index(name: &str) -> Option<u64> {
    SEGMENT_INDEX_RE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Content type by extension, defaulting to octet-stream.
#[must_use]
pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("mpd") => "application/dash+xml",
        Some("m4s" | "mp4") => "video/mp4",
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("vtt") => "text/vtt",
        Some("srt") => "application/x-subrip",
        _ => "application/octet-stream",
    }
}
