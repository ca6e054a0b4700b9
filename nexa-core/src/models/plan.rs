//! Stream plans: the planner's verdict on how a source reaches a client.

use serde::{Deserialize, Serialize};

use super::capability::SubtitleDeliveryMethod;
use super::id::MediaPartId;

/// How the media is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayMethod {
    /// Original file byte-for-byte.
    DirectPlay,
    /// Streams copied, container repackaged.
    DirectStream,
    /// At least one stream re-encoded.
    Transcode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamProtocol {
    Progressive,
    Dash,
    Hls,
}

impl StreamProtocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Progressive => "progressive",
            Self::Dash => "dash",
            Self::Hls => "hls",
        }
    }
}

/// Bitfield of reasons a source could not be copied as-is.
///
/// Wire representation is the decimal flag sum, transparent over u32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranscodeReasons(pub u32);

impl TranscodeReasons {
    pub const NONE: u32 = 0;
    pub const CONTAINER: u32 = 1;
    pub const VIDEO_CODEC: u32 = 1 << 1;
    pub const AUDIO_CODEC: u32 = 1 << 2;
    pub const SUBTITLE_CODEC: u32 = 1 << 3;
    pub const VIDEO_BITRATE: u32 = 1 << 4;
    pub const AUDIO_BITRATE: u32 = 1 << 5;
    pub const RESOLUTION: u32 = 1 << 6;
    pub const VIDEO_LEVEL: u32 = 1 << 7;
    pub const VIDEO_PROFILE: u32 = 1 << 8;
    pub const REF_FRAMES: u32 = 1 << 9;
    pub const BIT_DEPTH: u32 = 1 << 10;
    pub const AUDIO_CHANNELS: u32 = 1 << 11;
    pub const SAMPLE_RATE: u32 = 1 << 12;

    #[must_use]
    pub const fn empty() -> Self {
        Self(Self::NONE)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn add(&mut self, flag: u32) {
        self.0 |= flag;
    }

    #[must_use]
    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Map a failed condition property onto its reason flag.
    #[must_use]
    pub fn flag_for_property(property: &str) -> u32 {
        match property {
            "container" => Self::CONTAINER,
            "videoCodec" => Self::VIDEO_CODEC,
            "audioCodec" => Self::AUDIO_CODEC,
            "subtitleCodec" => Self::SUBTITLE_CODEC,
            "videoBitrate" => Self::VIDEO_BITRATE,
            "audioBitrate" => Self::AUDIO_BITRATE,
            "width" | "height" | "resolution" => Self::RESOLUTION,
            "videoLevel" => Self::VIDEO_LEVEL,
            "videoProfile" => Self::VIDEO_PROFILE,
            "refFrames" => Self::REF_FRAMES,
            "bitDepth" => Self::BIT_DEPTH,
            "audioChannels" => Self::AUDIO_CHANNELS,
            "sampleRate" => Self::SAMPLE_RATE,
            _ => Self::NONE,
        }
    }
}

impl std::ops::BitOr for TranscodeReasons {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Display for TranscodeReasons {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved delivery of one subtitle track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitlePlan {
    pub stream_index: u32,
    pub method: SubtitleDeliveryMethod,
    /// Target format after conversion ("vtt", "srt", "ass").
    pub format: String,
    /// Sidecar URL when the method is External.
    #[serde(default)]
    pub url: Option<String>,
}

/// The planner's full decision for one media part.
///
/// Derived, never stored. Invariants:
/// `DirectPlay` ⇒ copy both streams, no reasons, container unchanged.
/// `DirectStream` ⇒ copy both streams, no reasons, container may differ.
/// `Transcode` ⇒ reasons non-empty and at least one stream re-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPlan {
    pub method: PlayMethod,
    pub protocol: StreamProtocol,
    pub part_id: MediaPartId,
    /// Output container.
    pub container: String,
    /// Direct/progressive URL (DirectPlay, DirectStream progressive).
    pub direct_url: Option<String>,
    /// Manifest URL for segmented protocols.
    pub manifest_url: Option<String>,
    pub video_stream_index: Option<u32>,
    pub audio_stream_index: Option<u32>,
    pub subtitle_stream_index: Option<u32>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub copy_video: bool,
    pub copy_audio: bool,
    pub enable_tone_mapping: bool,
    pub use_hardware_acceleration: bool,
    pub transcode_reasons: TranscodeReasons,
    pub target_bitrate: Option<u64>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub target_audio_channels: Option<u32>,
    #[serde(default)]
    pub subtitle: Option<SubtitlePlan>,
}

impl StreamPlan {
    /// Whether this plan needs a transcode job (segmented output).
    #[must_use]
    pub fn requires_transcode_job(&self) -> bool {
        self.method == PlayMethod::Transcode
            || (self.method == PlayMethod::DirectStream
                && self.protocol != StreamProtocol::Progressive)
    }

    /// Check the mode/reasons coupling invariant.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        match self.method {
            PlayMethod::DirectPlay | PlayMethod::DirectStream => {
                self.copy_video && self.copy_audio && self.transcode_reasons.is_empty()
            }
            PlayMethod::Transcode => {
                !self.transcode_reasons.is_empty() && !(self.copy_video && self.copy_audio)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_flag_values() {
        assert_eq!(TranscodeReasons::CONTAINER, 1);
        assert_eq!(TranscodeReasons::VIDEO_CODEC, 2);
        assert_eq!(TranscodeReasons::AUDIO_CODEC, 4);
        assert_eq!(TranscodeReasons::SUBTITLE_CODEC, 8);
        assert_eq!(TranscodeReasons::VIDEO_BITRATE, 16);
        assert_eq!(TranscodeReasons::AUDIO_BITRATE, 32);
        assert_eq!(TranscodeReasons::RESOLUTION, 64);
        assert_eq!(TranscodeReasons::VIDEO_LEVEL, 128);
        assert_eq!(TranscodeReasons::VIDEO_PROFILE, 256);
        assert_eq!(TranscodeReasons::REF_FRAMES, 512);
        assert_eq!(TranscodeReasons::BIT_DEPTH, 1024);
        assert_eq!(TranscodeReasons::AUDIO_CHANNELS, 2048);
        assert_eq!(TranscodeReasons::SAMPLE_RATE, 4096);
    }

    #[test]
    fn test_reasons_accumulate() {
        let mut reasons = TranscodeReasons::empty();
        assert!(reasons.is_empty());
        reasons.add(TranscodeReasons::CONTAINER);
        reasons.add(TranscodeReasons::VIDEO_CODEC);
        reasons.add(TranscodeReasons::AUDIO_CODEC);
        reasons.add(TranscodeReasons::VIDEO_BITRATE);
        assert_eq!(reasons.0, 23);
        assert!(reasons.contains(TranscodeReasons::VIDEO_CODEC));
        assert!(!reasons.contains(TranscodeReasons::RESOLUTION));
    }

    #[test]
    fn test_reasons_serialize_as_decimal() {
        let reasons = TranscodeReasons(23);
        assert_eq!(serde_json::to_string(&reasons).unwrap(), "23");
    }

    #[test]
    fn test_flag_for_property() {
        assert_eq!(
            TranscodeReasons::flag_for_property("videoCodec"),
            TranscodeReasons::VIDEO_CODEC
        );
        assert_eq!(
            TranscodeReasons::flag_for_property("width"),
            TranscodeReasons::RESOLUTION
        );
        assert_eq!(TranscodeReasons::flag_for_property("unknown"), 0);
    }
}
