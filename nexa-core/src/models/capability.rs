//! Client capability declarations.
//!
//! A client declares what it can play natively when it opens a session. The
//! declaration is versioned per session (append-only, monotonic) and the
//! stream planner always plans against the newest version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::SessionId;
use super::plan::StreamProtocol;

/// One stored version of a session's capability declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityProfile {
    pub session_id: SessionId,
    /// Monotonically increasing per session; first declaration is 1.
    pub version: i32,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub capabilities: ClientCapabilities,
    pub declared_at: DateTime<Utc>,
}

/// The declarative capability body a client submits.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientCapabilities {
    /// Max bitrate for streamed (potentially transcoded) video, bits/second.
    pub max_streaming_bitrate: Option<u64>,
    /// Max bitrate for static (direct-play) delivery, bits/second.
    pub max_static_bitrate: Option<u64>,
    /// Max bitrate for music streaming, bits/second.
    pub max_music_bitrate: Option<u64>,
    pub direct_play_profiles: Vec<DirectPlayProfile>,
    pub transcoding_profiles: Vec<TranscodingProfile>,
    pub container_profiles: Vec<ContainerProfile>,
    pub codec_profiles: Vec<CodecProfile>,
    pub subtitle_profiles: Vec<SubtitleProfile>,
    pub response_profiles: Vec<ResponseProfile>,
    pub supported_image_formats: Vec<String>,
    pub supports_dash: bool,
    pub supports_hls: bool,
    pub supports_hdr: bool,
    pub supports_tone_mapping: bool,
}

/// Media type a profile applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Photo,
}

/// A container+codec combination the client plays without server help.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectPlayProfile {
    pub kind: MediaKind,
    /// Comma-delimited container list ("mp4,mov,m4v").
    pub container: String,
    /// Comma-delimited codec list; `None` accepts any.
    #[serde(default)]
    pub video_codec: Option<String>,
    #[serde(default)]
    pub audio_codec: Option<String>,
}

/// An output format the client accepts from the server's encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodingProfile {
    pub kind: MediaKind,
    /// Output container ("mp4", "ts", "mkv").
    pub container: String,
    pub protocol: StreamProtocol,
    /// Comma-delimited list of acceptable video codecs, preference order.
    pub video_codec: String,
    /// Comma-delimited list of acceptable audio codecs, preference order.
    pub audio_codec: String,
    #[serde(default)]
    pub max_audio_channels: Option<u32>,
    /// Profile-level bitrate cap, bits/second.
    #[serde(default)]
    pub max_bitrate: Option<u64>,
    /// Conditions applied when deciding whether a source stream may be
    /// copied into this profile's output.
    #[serde(default)]
    pub conditions: Vec<ProfileCondition>,
}

/// Conditions applied to a whole container, regardless of codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProfile {
    #[serde(default)]
    pub container: Option<String>,
    pub conditions: Vec<ProfileCondition>,
}

/// Conditions keyed by codec (and optionally container).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecProfile {
    pub kind: MediaKind,
    /// Comma-delimited codec list this profile constrains.
    pub codec: String,
    #[serde(default)]
    pub container: Option<String>,
    pub conditions: Vec<ProfileCondition>,
}

/// How the client wants a subtitle track delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleDeliveryMethod {
    /// Sidecar file fetched separately from the media stream.
    External,
    /// Muxed into the transcode output container.
    Embed,
    /// Burned into the video stream during transcoding.
    Encode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleProfile {
    /// Subtitle format ("vtt", "srt", "ass", "pgssub").
    pub format: String,
    pub method: SubtitleDeliveryMethod,
    #[serde(default)]
    pub protocol: Option<StreamProtocol>,
    /// Optional language filter (comma-delimited ISO 639 codes).
    #[serde(default)]
    pub language: Option<String>,
}

/// MIME override for a (kind, container) pair in responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseProfile {
    pub kind: MediaKind,
    pub container: String,
    pub mime_type: String,
}

/// Comparison operator of a profile condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThanEqual,
    LessThanEqual,
    /// Value is a pipe-delimited set; passes when the attribute equals any.
    EqualsAny,
    /// Attribute (comma/pipe-delimited or plain string) contains the value.
    Contains,
}

/// One declarative constraint over a source attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCondition {
    /// Source attribute name ("width", "videoBitrate", "audioChannels", ...).
    pub property: String,
    pub operator: ConditionOperator,
    pub value: String,
    /// A failing required condition disqualifies direct play / stream copy.
    #[serde(default)]
    pub is_required: bool,
    /// A failing condition with this flag records a transcode reason.
    #[serde(default)]
    pub is_required_for_transcoding: bool,
}

impl ClientCapabilities {
    /// Minimal profile synthesized when a session never declared anything:
    /// DASH supported, no direct play, one permissive transcoding profile,
    /// bitrate caps effectively unlimited. Real content routes to Transcode.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            max_streaming_bitrate: Some(u64::MAX),
            max_static_bitrate: Some(u64::MAX),
            max_music_bitrate: Some(u64::MAX),
            direct_play_profiles: Vec::new(),
            transcoding_profiles: vec![TranscodingProfile {
                kind: MediaKind::Video,
                container: "mp4".to_string(),
                protocol: StreamProtocol::Dash,
                video_codec: "h264".to_string(),
                audio_codec: "aac".to_string(),
                max_audio_channels: Some(2),
                max_bitrate: None,
                conditions: Vec::new(),
            }],
            container_profiles: Vec::new(),
            codec_profiles: Vec::new(),
            subtitle_profiles: Vec::new(),
            response_profiles: Vec::new(),
            supported_image_formats: Vec::new(),
            supports_dash: true,
            supports_hls: false,
            supports_hdr: false,
            supports_tone_mapping: false,
        }
    }

    /// Bitrate cap applicable to streamed video, unlimited when undeclared.
    #[must_use]
    pub fn streaming_bitrate_cap(&self) -> u64 {
        self.max_streaming_bitrate.unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_roundtrip_camel_case() {
        let caps = ClientCapabilities {
            max_streaming_bitrate: Some(20_000_000),
            direct_play_profiles: vec![DirectPlayProfile {
                kind: MediaKind::Video,
                container: "mp4".to_string(),
                video_codec: Some("h264".to_string()),
                audio_codec: Some("aac".to_string()),
            }],
            supports_dash: true,
            ..Default::default()
        };

        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["maxStreamingBitrate"], 20_000_000);
        assert_eq!(json["directPlayProfiles"][0]["container"], "mp4");

        let back: ClientCapabilities = serde_json::from_value(json).unwrap();
        assert_eq!(back, caps);
    }

    #[test]
    fn test_fallback_profile_routes_to_transcode() {
        let caps = ClientCapabilities::fallback();
        assert!(caps.direct_play_profiles.is_empty());
        assert!(caps.supports_dash);
        assert_eq!(caps.transcoding_profiles.len(), 1);
        assert_eq!(caps.streaming_bitrate_cap(), u64::MAX);
    }
}
