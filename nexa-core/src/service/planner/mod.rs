//! Stream planning: the pure decision procedure mapping source facts and a
//! capability declaration to a `StreamPlan`.
//!
//! Trial order is fixed: direct play, then direct stream (remux), then
//! transcode. The function is side-effect free; identical inputs yield
//! identical plans.

pub mod conditions;
pub mod subtitles;

use crate::models::{
    ClientCapabilities, MediaKind, MediaSourceFacts, PlayMethod, StreamPlan, StreamProtocol,
    SubtitleDeliveryMethod, TranscodeReasons, TranscodingProfile,
};
use crate::{Error, Result};

use conditions::{list_contains, passes};

/// Server-side encoder policy, resolved from configuration at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscodePolicy {
    pub allow_hardware_acceleration: bool,
    pub hardware_encoder_available: bool,
    pub allow_tone_mapping: bool,
}

/// Decide how to deliver `facts` to a client declaring `caps`.
///
/// `selected_subtitle` is the client-chosen subtitle stream index; when
/// `None` the default-flagged subtitle track (if any) is used.
pub fn plan(
    facts: &MediaSourceFacts,
    caps: &ClientCapabilities,
    policy: &TranscodePolicy,
    selected_subtitle: Option<u32>,
) -> Result<StreamPlan> {
    let kind = media_kind(facts);

    if kind == MediaKind::Photo {
        return Ok(direct_play_plan(facts));
    }

    let subtitle = subtitles::resolve(facts, caps, selected_subtitle);
    let burn_in = subtitle
        .as_ref()
        .is_some_and(|s| s.method == SubtitleDeliveryMethod::Encode);

    // Burned-in subtitles force a transcode regardless of codec fit.
    if !burn_in {
        if let Some(mut plan) = try_direct_play(facts, caps, kind) {
            plan.subtitle = subtitle;
            plan.subtitle_stream_index = plan.subtitle.as_ref().map(|s| s.stream_index);
            debug_assert!(plan.invariants_hold());
            return Ok(plan);
        }

        if let Some(mut plan) = try_direct_stream(facts, caps, kind) {
            plan.subtitle = subtitle;
            plan.subtitle_stream_index = plan.subtitle.as_ref().map(|s| s.stream_index);
            debug_assert!(plan.invariants_hold());
            return Ok(plan);
        }
    }

    let mut plan = transcode_plan(facts, caps, policy, kind, burn_in)?;
    plan.subtitle = subtitle;
    plan.subtitle_stream_index = plan.subtitle.as_ref().map(|s| s.stream_index);
    debug_assert!(plan.invariants_hold());
    Ok(plan)
}

fn media_kind(facts: &MediaSourceFacts) -> MediaKind {
    if facts.video_stream().is_some() {
        MediaKind::Video
    } else if facts.audio_stream().is_some() {
        MediaKind::Audio
    } else {
        MediaKind::Photo
    }
}

fn bitrate_cap(caps: &ClientCapabilities, kind: MediaKind) -> u64 {
    match kind {
        MediaKind::Audio => caps
            .max_music_bitrate
            .unwrap_or_else(|| caps.streaming_bitrate_cap()),
        _ => caps.streaming_bitrate_cap(),
    }
}

fn bare_plan(facts: &MediaSourceFacts, method: PlayMethod) -> StreamPlan {
    StreamPlan {
        method,
        protocol: StreamProtocol::Progressive,
        part_id: facts.part.id.clone(),
        container: facts.part.container.clone(),
        direct_url: Some(facts.part.direct_url.clone()),
        manifest_url: None,
        video_stream_index: facts.video_stream().map(|s| s.index),
        audio_stream_index: facts.audio_stream().map(|s| s.index),
        subtitle_stream_index: None,
        video_codec: facts.video_stream().map(|s| s.codec.clone()),
        audio_codec: facts.audio_stream().map(|s| s.codec.clone()),
        copy_video: true,
        copy_audio: true,
        enable_tone_mapping: false,
        use_hardware_acceleration: false,
        transcode_reasons: TranscodeReasons::empty(),
        target_bitrate: None,
        target_width: None,
        target_height: None,
        target_audio_channels: None,
        subtitle: None,
    }
}

fn direct_play_plan(facts: &MediaSourceFacts) -> StreamPlan {
    bare_plan(facts, PlayMethod::DirectPlay)
}

/// Direct-play trial: original container, original codecs, byte-for-byte.
fn try_direct_play(
    facts: &MediaSourceFacts,
    caps: &ClientCapabilities,
    kind: MediaKind,
) -> Option<StreamPlan> {
    let cap = bitrate_cap(caps, kind);
    if facts.effective_bitrate().is_some_and(|b| b > cap) {
        return None;
    }

    for profile in caps.direct_play_profiles.iter().filter(|p| p.kind == kind) {
        if !list_contains(&profile.container, &facts.part.container) {
            continue;
        }
        if let (Some(allowed), Some(stream)) = (&profile.video_codec, facts.video_stream()) {
            if !list_contains(allowed, &stream.codec) {
                continue;
            }
        }
        if let (Some(allowed), Some(stream)) = (&profile.audio_codec, facts.audio_stream()) {
            if !list_contains(allowed, &stream.codec) {
                continue;
            }
        }
        if !required_profile_conditions_pass(facts, caps, kind) {
            continue;
        }
        return Some(direct_play_plan(facts));
    }
    None
}

/// Direct-stream trial: copy the streams into a different container.
///
/// Only segmented protocols qualify; a progressive remux has no delivery
/// path in this server.
fn try_direct_stream(
    facts: &MediaSourceFacts,
    caps: &ClientCapabilities,
    kind: MediaKind,
) -> Option<StreamPlan> {
    let cap = bitrate_cap(caps, kind);
    if facts.effective_bitrate().is_some_and(|b| b > cap) {
        return None;
    }

    for profile in eligible_transcoding_profiles(caps, kind) {
        if profile.protocol == StreamProtocol::Progressive {
            continue;
        }
        let video_ok = facts
            .video_stream()
            .is_none_or(|s| list_contains(&profile.video_codec, &s.codec));
        let audio_ok = facts
            .audio_stream()
            .is_none_or(|s| list_contains(&profile.audio_codec, &s.codec));
        if !video_ok || !audio_ok {
            continue;
        }
        if !codec_conditions_pass(facts, caps, kind) {
            continue;
        }
        if profile
            .conditions
            .iter()
            .filter(|c| c.is_required)
            .any(|c| !passes(c, facts))
        {
            continue;
        }

        let mut plan = bare_plan(facts, PlayMethod::DirectStream);
        plan.container = profile.container.clone();
        plan.protocol = profile.protocol;
        plan.direct_url = None;
        plan.manifest_url = Some(manifest_path(facts, profile.protocol));
        return Some(plan);
    }
    None
}

/// Transcode fallback: the highest-priority (first listed) matching
/// profile wins; every failed apply-condition records a reason flag.
fn transcode_plan(
    facts: &MediaSourceFacts,
    caps: &ClientCapabilities,
    policy: &TranscodePolicy,
    kind: MediaKind,
    burn_in_subtitle: bool,
) -> Result<StreamPlan> {
    let Some(profile) = eligible_transcoding_profiles(caps, kind).next() else {
        return Err(Error::PlanUnavailable(format!(
            "no transcoding profile matches {kind:?} content",
        )));
    };

    let mut reasons = TranscodeReasons::empty();
    let mut copy_video = true;
    let mut copy_audio = true;

    if burn_in_subtitle {
        reasons.add(TranscodeReasons::SUBTITLE_CODEC);
        copy_video = false;
    }

    if !list_contains(&profile.container, &facts.part.container) {
        reasons.add(TranscodeReasons::CONTAINER);
    }

    let video = facts.video_stream();
    let audio = facts.audio_stream();

    if let Some(stream) = video {
        if !list_contains(&profile.video_codec, &stream.codec) {
            reasons.add(TranscodeReasons::VIDEO_CODEC);
            copy_video = false;
        }
    }
    if let Some(stream) = audio {
        if !list_contains(&profile.audio_codec, &stream.codec) {
            reasons.add(TranscodeReasons::AUDIO_CODEC);
            copy_audio = false;
        }
    }

    let cap = bitrate_cap(caps, kind).min(profile.max_bitrate.unwrap_or(u64::MAX));
    let source_bitrate = facts.effective_bitrate();
    if source_bitrate.is_some_and(|b| b > cap) {
        if video.is_some() {
            reasons.add(TranscodeReasons::VIDEO_BITRATE);
            copy_video = false;
        } else {
            reasons.add(TranscodeReasons::AUDIO_BITRATE);
            copy_audio = false;
        }
    }

    // Profile apply-conditions and codec-profile conditions flagged for
    // transcoding each contribute a reason when they fail.
    let mut failed: Vec<&crate::models::ProfileCondition> = Vec::new();
    for condition in profile
        .conditions
        .iter()
        .filter(|c| c.is_required_for_transcoding)
    {
        if !passes(condition, facts) {
            failed.push(condition);
        }
    }
    for codec_profile in caps.codec_profiles.iter().filter(|p| p.kind == kind) {
        let applies = match (&codec_profile.container, video, audio) {
            (Some(container), _, _) if !list_contains(container, &facts.part.container) => false,
            _ => {
                let codec_matches = |codec: &str| list_contains(&codec_profile.codec, codec);
                video.map(|s| codec_matches(&s.codec)).unwrap_or(false)
                    || audio.map(|s| codec_matches(&s.codec)).unwrap_or(false)
            }
        };
        if !applies {
            continue;
        }
        for condition in codec_profile
            .conditions
            .iter()
            .filter(|c| c.is_required_for_transcoding)
        {
            if !passes(condition, facts) {
                failed.push(condition);
            }
        }
    }

    for condition in &failed {
        let flag = TranscodeReasons::flag_for_property(&condition.property);
        if flag == TranscodeReasons::NONE {
            continue;
        }
        reasons.add(flag);
        if is_audio_property(&condition.property) {
            copy_audio = false;
        } else {
            copy_video = false;
        }
    }

    // Tone mapping: HDR source, SDR-only client willing to tone map.
    let source_is_hdr = video.is_some_and(|s| s.is_hdr());
    let enable_tone_mapping = source_is_hdr
        && !caps.supports_hdr
        && caps.supports_tone_mapping
        && policy.allow_tone_mapping;
    if enable_tone_mapping {
        reasons.add(TranscodeReasons::BIT_DEPTH);
        copy_video = false;
    }

    // Channel clamping
    let source_channels = audio.and_then(|s| s.channels);
    let target_audio_channels = match (source_channels, profile.max_audio_channels) {
        (Some(src), Some(max)) if src > max => {
            reasons.add(TranscodeReasons::AUDIO_CHANNELS);
            copy_audio = false;
            Some(max)
        }
        (Some(src), Some(max)) => Some(src.min(max)),
        (Some(src), None) => Some(src),
        (None, max) => max,
    };

    if copy_video && copy_audio {
        // Nothing disqualifies copying the streams (a container change at
        // most); deliver as a remux.
        let mut plan = bare_plan(facts, PlayMethod::DirectStream);
        plan.container = profile.container.clone();
        plan.protocol = profile.protocol;
        plan.direct_url = None;
        plan.manifest_url = Some(manifest_path(facts, profile.protocol));
        return Ok(plan);
    }

    // Target codecs: first allowed not requiring transcoding, else first
    // listed.
    let target_video_codec = video.map(|stream| {
        if list_contains(&profile.video_codec, &stream.codec) {
            stream.codec.clone()
        } else {
            first_listed(&profile.video_codec)
        }
    });
    let target_audio_codec = audio.map(|stream| {
        if list_contains(&profile.audio_codec, &stream.codec) {
            stream.codec.clone()
        } else {
            first_listed(&profile.audio_codec)
        }
    });

    let target_bitrate = if copy_video && copy_audio {
        None
    } else {
        match source_bitrate {
            Some(b) => Some(b.min(cap)),
            None if cap < u64::MAX => Some(cap),
            None => None,
        }
    };

    let (target_width, target_height) =
        clamp_resolution(facts, &failed, reasons.contains(TranscodeReasons::RESOLUTION));

    let mut plan = bare_plan(facts, PlayMethod::Transcode);
    plan.container = profile.container.clone();
    plan.protocol = profile.protocol;
    plan.direct_url = None;
    plan.manifest_url = Some(manifest_path(facts, profile.protocol));
    plan.video_codec = target_video_codec;
    plan.audio_codec = target_audio_codec;
    plan.copy_video = copy_video;
    plan.copy_audio = copy_audio;
    plan.enable_tone_mapping = enable_tone_mapping;
    plan.use_hardware_acceleration =
        policy.allow_hardware_acceleration && policy.hardware_encoder_available;
    plan.transcode_reasons = reasons;
    plan.target_bitrate = target_bitrate;
    plan.target_width = target_width;
    plan.target_height = target_height;
    plan.target_audio_channels = target_audio_channels;
    Ok(plan)
}

fn eligible_transcoding_profiles<'a>(
    caps: &'a ClientCapabilities,
    kind: MediaKind,
) -> impl Iterator<Item = &'a TranscodingProfile> {
    caps.transcoding_profiles.iter().filter(move |p| {
        p.kind == kind
            && match p.protocol {
                StreamProtocol::Dash => caps.supports_dash,
                StreamProtocol::Hls => caps.supports_hls,
                StreamProtocol::Progressive => true,
            }
    })
}

fn required_profile_conditions_pass(
    facts: &MediaSourceFacts,
    caps: &ClientCapabilities,
    kind: MediaKind,
) -> bool {
    for container_profile in &caps.container_profiles {
        if let Some(container) = &container_profile.container {
            if !list_contains(container, &facts.part.container) {
                continue;
            }
        }
        if container_profile
            .conditions
            .iter()
            .filter(|c| c.is_required)
            .any(|c| !passes(c, facts))
        {
            return false;
        }
    }
    codec_conditions_pass(facts, caps, kind)
}

fn codec_conditions_pass(
    facts: &MediaSourceFacts,
    caps: &ClientCapabilities,
    kind: MediaKind,
) -> bool {
    let video = facts.video_stream();
    let audio = facts.audio_stream();
    for codec_profile in caps.codec_profiles.iter().filter(|p| p.kind == kind) {
        if let Some(container) = &codec_profile.container {
            if !list_contains(container, &facts.part.container) {
                continue;
            }
        }
        let codec_matches = |codec: &str| list_contains(&codec_profile.codec, codec);
        let applies = video.map(|s| codec_matches(&s.codec)).unwrap_or(false)
            || audio.map(|s| codec_matches(&s.codec)).unwrap_or(false);
        if !applies {
            continue;
        }
        if codec_profile
            .conditions
            .iter()
            .filter(|c| c.is_required)
            .any(|c| !passes(c, facts))
        {
            return false;
        }
    }
    true
}

fn is_audio_property(property: &str) -> bool {
    matches!(
        property,
        "audioCodec" | "audioBitrate" | "audioChannels" | "sampleRate"
    )
}

fn first_listed(list: &str) -> String {
    list.split(',')
        .next()
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Clamp target dimensions from failed LessThanEqual width/height
/// conditions, preserving aspect ratio (rounded to even).
fn clamp_resolution(
    facts: &MediaSourceFacts,
    failed: &[&crate::models::ProfileCondition],
    resolution_flagged: bool,
) -> (Option<u32>, Option<u32>) {
    if !resolution_flagged {
        return (None, None);
    }
    let Some(video) = facts.video_stream() else {
        return (None, None);
    };
    let (Some(src_w), Some(src_h)) = (video.width, video.height) else {
        return (None, None);
    };

    let mut max_w = src_w;
    let mut max_h = src_h;
    for condition in failed {
        if condition.operator != crate::models::ConditionOperator::LessThanEqual {
            continue;
        }
        if let Ok(limit) = condition.value.parse::<u32>() {
            match condition.property.as_str() {
                "width" => max_w = max_w.min(limit),
                "height" => max_h = max_h.min(limit),
                _ => {}
            }
        }
    }

    // Scale uniformly to fit both limits
    let scale = f64::from(max_w) / f64::from(src_w);
    let scale = scale.min(f64::from(max_h) / f64::from(src_h));
    let width = ((f64::from(src_w) * scale) as u32) & !1;
    let height = ((f64::from(src_h) * scale) as u32) & !1;
    (Some(width), Some(height))
}

fn manifest_path(facts: &MediaSourceFacts, protocol: StreamProtocol) -> String {
    match protocol {
        StreamProtocol::Hls => format!("/stream/part/{}/hls/main.m3u8", facts.part.id),
        _ => format!("/stream/part/{}/dash/manifest.mpd", facts.part.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ConditionOperator, DirectPlayProfile, ItemId, MediaPart, MediaPartId, MediaStream,
        ProfileCondition, StreamKind, SubtitleProfile,
    };

    fn source(container: &str, vcodec: &str, acodec: &str, bitrate: u64) -> MediaSourceFacts {
        MediaSourceFacts {
            item_id: ItemId::from_string("item00000001".to_string()),
            part: MediaPart {
                id: MediaPartId::from_string("part00000001".to_string()),
                item_id: ItemId::from_string("item00000001".to_string()),
                path: format!("/library/film.{container}"),
                container: container.to_string(),
                duration_ms: 5_400_000,
                size_bytes: None,
                direct_url: format!("/parts/part00000001/file.{container}"),
                keyframes_ms: vec![],
            },
            streams: vec![
                MediaStream {
                    index: 0,
                    kind: StreamKind::Video,
                    codec: vcodec.to_string(),
                    width: Some(1920),
                    height: Some(1080),
                    bitrate: Some(bitrate),
                    ..Default::default()
                },
                MediaStream {
                    index: 1,
                    kind: StreamKind::Audio,
                    codec: acodec.to_string(),
                    channels: Some(6),
                    ..Default::default()
                },
            ],
            bitrate: Some(bitrate),
            trickplay: None,
        }
    }

    fn capability(
        direct_containers: &str,
        vcodec: &str,
        acodec: &str,
        streaming_cap: u64,
    ) -> ClientCapabilities {
        ClientCapabilities {
            max_streaming_bitrate: Some(streaming_cap),
            direct_play_profiles: vec![DirectPlayProfile {
                kind: MediaKind::Video,
                container: direct_containers.to_string(),
                video_codec: Some(vcodec.to_string()),
                audio_codec: Some(acodec.to_string()),
            }],
            transcoding_profiles: vec![TranscodingProfile {
                kind: MediaKind::Video,
                container: "mp4".to_string(),
                protocol: StreamProtocol::Dash,
                video_codec: "h264".to_string(),
                audio_codec: "aac".to_string(),
                max_audio_channels: Some(6),
                max_bitrate: None,
                conditions: Vec::new(),
            }],
            supports_dash: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_direct_play_straight_through() {
        let facts = source("mp4", "h264", "aac", 4_000_000);
        let caps = capability("mp4", "h264", "aac", 60_000_000);

        let plan = plan(&facts, &caps, &TranscodePolicy::default(), None).unwrap();
        assert_eq!(plan.method, PlayMethod::DirectPlay);
        assert_eq!(plan.protocol, StreamProtocol::Progressive);
        assert_eq!(plan.transcode_reasons.0, 0);
        assert_eq!(plan.direct_url.as_deref(), Some("/parts/part00000001/file.mp4"));
        assert!(plan.copy_video && plan.copy_audio);
        assert_eq!(plan.container, "mp4");
    }

    #[test]
    fn test_container_change_only_remuxes() {
        let facts = source("mkv", "h264", "aac", 4_000_000);
        let caps = capability("mp4", "h264", "aac", 60_000_000);

        let plan = plan(&facts, &caps, &TranscodePolicy::default(), None).unwrap();
        assert_eq!(plan.method, PlayMethod::DirectStream);
        assert_eq!(plan.protocol, StreamProtocol::Dash);
        assert!(plan.copy_video && plan.copy_audio);
        assert_eq!(plan.container, "mp4");
        assert_eq!(plan.transcode_reasons.0, 0);
        assert_eq!(
            plan.manifest_url.as_deref(),
            Some("/stream/part/part00000001/dash/manifest.mpd")
        );
    }

    #[test]
    fn test_codec_transcode_accumulates_reasons() {
        let facts = source("mkv", "hevc", "dtshd", 40_000_000);
        let caps = capability("mp4", "h264", "aac", 20_000_000);

        let plan = plan(&facts, &caps, &TranscodePolicy::default(), None).unwrap();
        assert_eq!(plan.method, PlayMethod::Transcode);
        // Container | VideoCodec | AudioCodec | VideoBitrate
        assert_eq!(plan.transcode_reasons.0, 23);
        assert_eq!(plan.video_codec.as_deref(), Some("h264"));
        assert_eq!(plan.audio_codec.as_deref(), Some("aac"));
        assert_eq!(plan.target_bitrate, Some(20_000_000));
        assert!(!plan.copy_video);
        assert!(!plan.copy_audio);
    }

    #[test]
    fn test_planner_is_deterministic() {
        let facts = source("mkv", "hevc", "dtshd", 40_000_000);
        let caps = capability("mp4", "h264", "aac", 20_000_000);
        let policy = TranscodePolicy::default();

        let first = plan(&facts, &caps, &policy, None).unwrap();
        for _ in 0..16 {
            assert_eq!(plan(&facts, &caps, &policy, None).unwrap(), first);
        }
    }

    #[test]
    fn test_expanding_capability_never_downgrades() {
        let facts = source("mp4", "h264", "aac", 4_000_000);

        let mut narrow = capability("mp4", "h264", "aac", 60_000_000);
        narrow.direct_play_profiles.clear();
        let narrow_plan = plan(&facts, &narrow, &TranscodePolicy::default(), None).unwrap();
        assert_ne!(narrow_plan.method, PlayMethod::DirectPlay);

        let wide = capability("mp4", "h264", "aac", 60_000_000);
        let wide_plan = plan(&facts, &wide, &TranscodePolicy::default(), None).unwrap();
        assert_eq!(wide_plan.method, PlayMethod::DirectPlay);
    }

    #[test]
    fn test_transcode_reasons_soundness() {
        let cases = [
            source("mp4", "h264", "aac", 4_000_000),
            source("mkv", "h264", "aac", 4_000_000),
            source("mkv", "hevc", "dtshd", 40_000_000),
            source("avi", "mpeg4", "mp3", 1_000_000),
        ];
        let caps = capability("mp4", "h264", "aac", 20_000_000);
        for facts in &cases {
            let plan = plan(facts, &caps, &TranscodePolicy::default(), None).unwrap();
            assert_eq!(
                plan.method == PlayMethod::Transcode,
                !plan.transcode_reasons.is_empty(),
                "mode/reasons coupling violated for {}",
                facts.part.container
            );
        }
    }

    #[test]
    fn test_bitrate_over_cap_forces_transcode() {
        let facts = source("mp4", "h264", "aac", 80_000_000);
        let caps = capability("mp4", "h264", "aac", 20_000_000);

        let plan = plan(&facts, &caps, &TranscodePolicy::default(), None).unwrap();
        assert_eq!(plan.method, PlayMethod::Transcode);
        assert!(plan
            .transcode_reasons
            .contains(TranscodeReasons::VIDEO_BITRATE));
        assert_eq!(plan.target_bitrate, Some(20_000_000));
        // Codec itself is acceptable, so the target keeps it
        assert_eq!(plan.video_codec.as_deref(), Some("h264"));
    }

    #[test]
    fn test_resolution_condition_clamps_target() {
        let mut facts = source("mkv", "hevc", "aac", 10_000_000);
        facts.streams[0].width = Some(3840);
        facts.streams[0].height = Some(2160);

        let mut caps = capability("mp4", "h264", "aac", 60_000_000);
        caps.transcoding_profiles[0].conditions = vec![ProfileCondition {
            property: "width".to_string(),
            operator: ConditionOperator::LessThanEqual,
            value: "1920".to_string(),
            is_required: true,
            is_required_for_transcoding: true,
        }];

        let plan = plan(&facts, &caps, &TranscodePolicy::default(), None).unwrap();
        assert_eq!(plan.method, PlayMethod::Transcode);
        assert!(plan.transcode_reasons.contains(TranscodeReasons::RESOLUTION));
        assert_eq!(plan.target_width, Some(1920));
        assert_eq!(plan.target_height, Some(1080));
    }

    #[test]
    fn test_tone_mapping_for_sdr_client() {
        let mut facts = source("mp4", "hevc", "aac", 10_000_000);
        facts.streams[0].color_space = Some("smpte2084".to_string());

        let mut caps = capability("mp4", "hevc", "aac", 60_000_000);
        caps.supports_hdr = false;
        caps.supports_tone_mapping = true;

        let policy = TranscodePolicy {
            allow_tone_mapping: true,
            ..Default::default()
        };
        let plan = plan(&facts, &caps, &policy, None).unwrap();
        assert_eq!(plan.method, PlayMethod::Transcode);
        assert!(plan.enable_tone_mapping);
        assert!(!plan.copy_video);
        assert!(plan.copy_audio);
    }

    #[test]
    fn test_channel_clamp() {
        let facts = source("mkv", "h264", "flac", 8_000_000);
        let mut caps = capability("mp4", "h264", "aac", 60_000_000);
        caps.transcoding_profiles[0].max_audio_channels = Some(2);

        let plan = plan(&facts, &caps, &TranscodePolicy::default(), None).unwrap();
        assert_eq!(plan.method, PlayMethod::Transcode);
        assert!(plan
            .transcode_reasons
            .contains(TranscodeReasons::AUDIO_CHANNELS));
        assert_eq!(plan.target_audio_channels, Some(2));
    }

    #[test]
    fn test_no_profile_at_all_is_unplannable() {
        let facts = source("mkv", "hevc", "dts", 10_000_000);
        let caps = ClientCapabilities::default();

        let result = plan(&facts, &caps, &TranscodePolicy::default(), None);
        assert!(matches!(result, Err(Error::PlanUnavailable(_))));
    }

    #[test]
    fn test_burned_in_subtitles_force_transcode() {
        let mut facts = source("mp4", "h264", "aac", 4_000_000);
        facts.streams.push(MediaStream {
            index: 2,
            kind: StreamKind::Subtitle,
            codec: "pgssub".to_string(),
            is_default: true,
            ..Default::default()
        });

        let mut caps = capability("mp4", "h264", "aac", 60_000_000);
        caps.subtitle_profiles = vec![SubtitleProfile {
            format: "pgssub".to_string(),
            method: SubtitleDeliveryMethod::Encode,
            protocol: None,
            language: None,
        }];

        let plan = plan(&facts, &caps, &TranscodePolicy::default(), None).unwrap();
        assert_eq!(plan.method, PlayMethod::Transcode);
        assert!(plan
            .transcode_reasons
            .contains(TranscodeReasons::SUBTITLE_CODEC));
        assert!(!plan.copy_video);
        assert_eq!(plan.subtitle_stream_index, Some(2));
    }
}
