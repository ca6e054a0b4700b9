//! Declarative condition evaluation against source media attributes.
//!
//! One evaluator serves the container, codec, and subtitle profile passes.
//! Conditions whose attribute the source does not report are treated as
//! passing; the catalog cannot disprove them.

use crate::models::{ConditionOperator, MediaSourceFacts, ProfileCondition, StreamKind};

/// A typed source attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(u64),
    Float(f64),
    Bool(bool),
}

impl AttrValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn as_str(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
        }
    }
}

/// Look up a condition property on the source.
///
/// Video properties read the default video stream, audio properties the
/// default audio stream.
#[must_use]
pub fn source_attribute(facts: &MediaSourceFacts, property: &str) -> Option<AttrValue> {
    let video = facts.video_stream();
    let audio = facts.audio_stream();

    match property {
        "container" => Some(AttrValue::Str(facts.part.container.clone())),
        "videoCodec" => video.map(|s| AttrValue::Str(s.codec.clone())),
        "videoProfile" => video.and_then(|s| s.profile.clone()).map(AttrValue::Str),
        "videoLevel" => video.and_then(|s| s.level).map(AttrValue::Float),
        "videoBitrate" => video.and_then(|s| s.bitrate).map(AttrValue::Int),
        "width" => video.and_then(|s| s.width).map(|v| AttrValue::Int(v.into())),
        "height" => video.and_then(|s| s.height).map(|v| AttrValue::Int(v.into())),
        "frameRate" => video.and_then(|s| s.frame_rate).map(AttrValue::Float),
        "bitDepth" => video.and_then(|s| s.bit_depth).map(|v| AttrValue::Int(v.into())),
        "refFrames" => video.and_then(|s| s.ref_frames).map(|v| AttrValue::Int(v.into())),
        "colorSpace" => video.and_then(|s| s.color_space.clone()).map(AttrValue::Str),
        "isHdr" => video.map(|s| AttrValue::Bool(s.is_hdr())),
        "audioCodec" => audio.map(|s| AttrValue::Str(s.codec.clone())),
        "audioBitrate" => audio.and_then(|s| s.bitrate).map(AttrValue::Int),
        "audioChannels" => audio.and_then(|s| s.channels).map(|v| AttrValue::Int(v.into())),
        "sampleRate" => audio.and_then(|s| s.sample_rate).map(|v| AttrValue::Int(v.into())),
        "subtitleCodec" => facts
            .streams
            .iter()
            .find(|s| s.kind == StreamKind::Subtitle && s.is_default)
            .map(|s| AttrValue::Str(s.codec.clone())),
        _ => None,
    }
}

/// Whether a single condition holds for the source.
///
/// Returns `None` when the source does not report the attribute.
#[must_use]
pub fn evaluate(condition: &ProfileCondition, facts: &MediaSourceFacts) -> Option<bool> {
    let attr = source_attribute(facts, &condition.property)?;
    Some(compare(&attr, condition.operator, &condition.value))
}

/// A condition passes unless the attribute is known and the comparison
/// fails.
#[must_use]
pub fn passes(condition: &ProfileCondition, facts: &MediaSourceFacts) -> bool {
    evaluate(condition, facts).unwrap_or(true)
}

fn compare(attr: &AttrValue, operator: ConditionOperator, value: &str) -> bool {
    match operator {
        ConditionOperator::Equals => equals(attr, value),
        ConditionOperator::NotEquals => !equals(attr, value),
        ConditionOperator::GreaterThanEqual => match attr.as_f64() {
            Some(actual) => value.parse::<f64>().map(|v| actual >= v).unwrap_or(false),
            None => false,
        },
        ConditionOperator::LessThanEqual => match attr.as_f64() {
            Some(actual) => value.parse::<f64>().map(|v| actual <= v).unwrap_or(false),
            None => false,
        },
        ConditionOperator::EqualsAny => value
            .split('|')
            .any(|candidate| equals(attr, candidate.trim())),
        ConditionOperator::Contains => attr
            .as_str()
            .to_ascii_lowercase()
            .contains(&value.to_ascii_lowercase()),
    }
}

fn equals(attr: &AttrValue, value: &str) -> bool {
    match attr {
        AttrValue::Str(s) => s.eq_ignore_ascii_case(value.trim()),
        AttrValue::Bool(b) => value
            .parse::<bool>()
            .map(|v| v == *b)
            .unwrap_or(false),
        _ => match attr.as_f64() {
            Some(actual) => value
                .parse::<f64>()
                .map(|v| (actual - v).abs() < f64::EPSILON)
                .unwrap_or(false),
            None => false,
        },
    }
}

/// Case-insensitive membership in a comma-delimited list.
#[must_use]
pub fn list_contains(list: &str, value: &str) -> bool {
    list.split(',')
        .any(|entry| entry.trim().eq_ignore_ascii_case(value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemId, MediaPart, MediaPartId, MediaStream};

    fn facts() -> MediaSourceFacts {
        MediaSourceFacts {
            item_id: ItemId::from_string("item00000001".to_string()),
            part: MediaPart {
                id: MediaPartId::from_string("part00000001".to_string()),
                item_id: ItemId::from_string("item00000001".to_string()),
                path: "/library/show.mkv".to_string(),
                container: "mkv".to_string(),
                duration_ms: 1_200_000,
                size_bytes: None,
                direct_url: "/parts/part00000001/file.mkv".to_string(),
                keyframes_ms: vec![],
            },
            streams: vec![
                MediaStream {
                    index: 0,
                    kind: StreamKind::Video,
                    codec: "hevc".to_string(),
                    profile: Some("Main 10".to_string()),
                    level: Some(153.0),
                    bitrate: Some(25_000_000),
                    width: Some(3840),
                    height: Some(2160),
                    bit_depth: Some(10),
                    ..Default::default()
                },
                MediaStream {
                    index: 1,
                    kind: StreamKind::Audio,
                    codec: "dts".to_string(),
                    channels: Some(6),
                    sample_rate: Some(48_000),
                    ..Default::default()
                },
            ],
            bitrate: None,
            trickplay: None,
        }
    }

    fn condition(property: &str, operator: ConditionOperator, value: &str) -> ProfileCondition {
        ProfileCondition {
            property: property.to_string(),
            operator,
            value: value.to_string(),
            is_required: true,
            is_required_for_transcoding: false,
        }
    }

    #[test]
    fn test_equals_is_case_insensitive() {
        let facts = facts();
        assert!(passes(
            &condition("videoCodec", ConditionOperator::Equals, "HEVC"),
            &facts
        ));
        assert!(!passes(
            &condition("videoCodec", ConditionOperator::Equals, "h264"),
            &facts
        ));
    }

    #[test]
    fn test_numeric_bounds() {
        let facts = facts();
        assert!(passes(
            &condition("width", ConditionOperator::LessThanEqual, "3840"),
            &facts
        ));
        assert!(!passes(
            &condition("width", ConditionOperator::LessThanEqual, "1920"),
            &facts
        ));
        assert!(passes(
            &condition("bitDepth", ConditionOperator::GreaterThanEqual, "10"),
            &facts
        ));
    }

    #[test]
    fn test_equals_any() {
        let facts = facts();
        assert!(passes(
            &condition("audioCodec", ConditionOperator::EqualsAny, "aac|ac3|dts"),
            &facts
        ));
        assert!(!passes(
            &condition("audioCodec", ConditionOperator::EqualsAny, "aac|mp3"),
            &facts
        ));
    }

    #[test]
    fn test_unknown_attribute_passes() {
        let facts = facts();
        // No frame rate reported: the condition cannot be disproved
        assert!(passes(
            &condition("frameRate", ConditionOperator::LessThanEqual, "30"),
            &facts
        ));
        assert_eq!(
            evaluate(
                &condition("frameRate", ConditionOperator::LessThanEqual, "30"),
                &facts
            ),
            None
        );
    }

    #[test]
    fn test_list_contains() {
        assert!(list_contains("mp4,mov,m4v", "MOV"));
        assert!(list_contains("mp4, mov , m4v", "m4v"));
        assert!(!list_contains("mp4,mov", "mkv"));
    }
}
