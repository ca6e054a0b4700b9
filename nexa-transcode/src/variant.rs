//! Variant keys: the name of a reusable transcode output.
//!
//! Two requests share a directory exactly when their plans agree on
//! protocol, codecs, bitrate, and resolution. The key doubles as the
//! directory name, so it stays filesystem-safe.

use nexa_core::models::StreamPlan;

/// Derive the variant key for a plan.
#[must_use]
pub fn variant_key(plan: &StreamPlan) -> String {
    let video = if plan.copy_video {
        "vcopy".to_string()
    } else {
        plan.video_codec.clone().unwrap_or_else(|| "novideo".to_string())
    };
    let audio = if plan.copy_audio {
        "acopy".to_string()
    } else {
        plan.audio_codec.clone().unwrap_or_else(|| "noaudio".to_string())
    };
    let bitrate = plan
        .target_bitrate
        .map_or_else(|| "src".to_string(), |b| b.to_string());
    let resolution = match (plan.target_width, plan.target_height) {
        (Some(w), Some(h)) => format!("{w}x{h}"),
        _ => "src".to_string(),
    };

    sanitize(&format!(
        "{}-{}-{}-{}-{}",
        plan.protocol.as_str(),
        video,
        audio,
        bitrate,
        resolution
    ))
}

fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == 'x' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexa_core::models::{
        MediaPartId, PlayMethod, StreamProtocol, TranscodeReasons,
    };

    fn plan() -> StreamPlan {
        StreamPlan {
            method: PlayMethod::Transcode,
            protocol: StreamProtocol::Dash,
            part_id: MediaPartId::from_string("part00000001".to_string()),
            container: "mp4".to_string(),
            direct_url: None,
            manifest_url: None,
            video_stream_index: Some(0),
            audio_stream_index: Some(1),
            subtitle_stream_index: None,
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
            copy_video: false,
            copy_audio: false,
            enable_tone_mapping: false,
            use_hardware_acceleration: false,
            transcode_reasons: TranscodeReasons(23),
            target_bitrate: Some(20_000_000),
            target_width: Some(1920),
            target_height: Some(1080),
            target_audio_channels: Some(6),
            subtitle: None,
        }
    }

    #[test]
    fn test_key_is_stable_and_safe() {
        let key = variant_key(&plan());
        assert_eq!(key, "dash-h264-aac-20000000-1920x1080");
        assert_eq!(variant_key(&plan()), key);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == 'x'));
    }

    #[test]
    fn test_copy_plans_share_a_key() {
        let mut remux = plan();
        remux.method = PlayMethod::DirectStream;
        remux.copy_video = true;
        remux.copy_audio = true;
        remux.video_codec = Some("hevc".to_string());
        remux.target_bitrate = None;
        remux.target_width = None;
        remux.target_height = None;
        assert_eq!(variant_key(&remux), "dash-vcopy-acopy-src-src");
    }

    #[test]
    fn test_different_bitrates_get_different_keys() {
        let a = plan();
        let mut b = plan();
        b.target_bitrate = Some(10_000_000);
        assert_ne!(variant_key(&a), variant_key(&b));
    }
}
