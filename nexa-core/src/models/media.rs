//! Source media facts as reported by the catalog.
//!
//! The playback core never inspects media files itself; everything the
//! planner and the transcode manager need arrives in these records.

use serde::{Deserialize, Serialize};

use super::id::{ItemId, MediaPartId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

/// One elementary stream inside a media part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaStream {
    pub index: u32,
    pub kind: StreamKind,
    pub codec: String,
    pub profile: Option<String>,
    pub level: Option<f64>,
    /// Bits per second.
    pub bitrate: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub bit_depth: Option<u32>,
    pub color_space: Option<String>,
    pub ref_frames: Option<u32>,
    pub channels: Option<u32>,
    pub sample_rate: Option<u32>,
    pub language: Option<String>,
    pub is_default: bool,
}

impl Default for MediaStream {
    fn default() -> Self {
        Self {
            index: 0,
            kind: StreamKind::Video,
            codec: String::new(),
            profile: None,
            level: None,
            bitrate: None,
            width: None,
            height: None,
            frame_rate: None,
            bit_depth: None,
            color_space: None,
            ref_frames: None,
            channels: None,
            sample_rate: None,
            language: None,
            is_default: false,
        }
    }
}

impl MediaStream {
    /// HDR detection by color space; the catalog normalizes transfer
    /// characteristics into this field.
    #[must_use]
    pub fn is_hdr(&self) -> bool {
        self.color_space
            .as_deref()
            .is_some_and(|cs| matches!(cs, "bt2020" | "smpte2084" | "arib-std-b67"))
    }
}

/// One playable file (part) of a library item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPart {
    pub id: MediaPartId,
    pub item_id: ItemId,
    /// Filesystem path the encoder reads from.
    pub path: String,
    pub container: String,
    pub duration_ms: u64,
    pub size_bytes: Option<u64>,
    /// URL serving the original bytes (direct play / progressive).
    pub direct_url: String,
    /// Keyframe timestamps in milliseconds, ascending. Empty when the GoP
    /// index has not been built for this part.
    #[serde(default)]
    pub keyframes_ms: Vec<u64>,
}

/// Trickplay (scrub preview) sprite facts for a part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrickplayFacts {
    /// Milliseconds between consecutive thumbnails.
    pub interval_ms: u64,
    pub thumb_width: u32,
    pub thumb_height: u32,
    /// Thumbnails per sprite sheet row / column.
    pub tile_cols: u32,
    pub tile_rows: u32,
    pub thumb_count: u32,
    /// URL template with `{index}` for the sprite sheet number.
    pub sprite_url_template: String,
}

/// Everything the stream planner needs to know about a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSourceFacts {
    pub item_id: ItemId,
    pub part: MediaPart,
    pub streams: Vec<MediaStream>,
    /// Overall bitrate, bits per second, when known.
    pub bitrate: Option<u64>,
    #[serde(default)]
    pub trickplay: Option<TrickplayFacts>,
}

impl MediaSourceFacts {
    /// The default-flagged video stream, else the first one.
    #[must_use]
    pub fn video_stream(&self) -> Option<&MediaStream> {
        let videos = || self.streams.iter().filter(|s| s.kind == StreamKind::Video);
        videos().find(|s| s.is_default).or_else(|| videos().next())
    }

    /// The default-flagged audio stream, else the first one.
    #[must_use]
    pub fn audio_stream(&self) -> Option<&MediaStream> {
        let audios = || self.streams.iter().filter(|s| s.kind == StreamKind::Audio);
        audios().find(|s| s.is_default).or_else(|| audios().next())
    }

    pub fn subtitle_streams(&self) -> impl Iterator<Item = &MediaStream> {
        self.streams.iter().filter(|s| s.kind == StreamKind::Subtitle)
    }

    /// Effective source bitrate: the container-level figure, else the sum of
    /// the selected stream bitrates.
    #[must_use]
    pub fn effective_bitrate(&self) -> Option<u64> {
        if self.bitrate.is_some() {
            return self.bitrate;
        }
        let video = self.video_stream().and_then(|s| s.bitrate);
        let audio = self.audio_stream().and_then(|s| s.bitrate);
        match (video, audio) {
            (None, None) => None,
            (v, a) => Some(v.unwrap_or(0) + a.unwrap_or(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part() -> MediaPart {
        MediaPart {
            id: MediaPartId::from_string("part00000001".to_string()),
            item_id: ItemId::from_string("item00000001".to_string()),
            path: "/library/movie.mkv".to_string(),
            container: "mkv".to_string(),
            duration_ms: 7_200_000,
            size_bytes: Some(4_000_000_000),
            direct_url: "/library/parts/part00000001/file.mkv".to_string(),
            keyframes_ms: vec![0, 4000, 8000],
        }
    }

    #[test]
    fn test_effective_bitrate_prefers_container_figure() {
        let facts = MediaSourceFacts {
            item_id: ItemId::from_string("item00000001".to_string()),
            part: part(),
            streams: vec![MediaStream {
                kind: StreamKind::Video,
                bitrate: Some(5_000_000),
                ..Default::default()
            }],
            bitrate: Some(6_000_000),
            trickplay: None,
        };
        assert_eq!(facts.effective_bitrate(), Some(6_000_000));
    }

    #[test]
    fn test_effective_bitrate_sums_streams() {
        let facts = MediaSourceFacts {
            item_id: ItemId::from_string("item00000001".to_string()),
            part: part(),
            streams: vec![
                MediaStream {
                    kind: StreamKind::Video,
                    bitrate: Some(5_000_000),
                    ..Default::default()
                },
                MediaStream {
                    index: 1,
                    kind: StreamKind::Audio,
                    bitrate: Some(192_000),
                    ..Default::default()
                },
            ],
            bitrate: None,
            trickplay: None,
        };
        assert_eq!(facts.effective_bitrate(), Some(5_192_000));
    }

    #[test]
    fn test_hdr_detection() {
        let mut stream = MediaStream::default();
        assert!(!stream.is_hdr());
        stream.color_space = Some("bt2020".to_string());
        assert!(stream.is_hdr());
        stream.color_space = Some("bt709".to_string());
        assert!(!stream.is_hdr());
    }

    #[test]
    fn test_default_stream_selection() {
        let facts = MediaSourceFacts {
            item_id: ItemId::from_string("item00000001".to_string()),
            part: part(),
            streams: vec![
                MediaStream {
                    index: 0,
                    kind: StreamKind::Video,
                    codec: "h264".to_string(),
                    ..Default::default()
                },
                MediaStream {
                    index: 1,
                    kind: StreamKind::Audio,
                    codec: "ac3".to_string(),
                    ..Default::default()
                },
                MediaStream {
                    index: 2,
                    kind: StreamKind::Audio,
                    codec: "aac".to_string(),
                    is_default: true,
                    ..Default::default()
                },
            ],
            bitrate: None,
            trickplay: None,
        };
        assert_eq!(facts.audio_stream().map(|s| s.index), Some(2));
    }
}
