//! Subtitle delivery resolution.
//!
//! A secondary pass over the capability's subtitle profiles: a selected
//! subtitle stream is delivered externally (converted sidecar), embedded
//! (muxed into the output), or encoded (burned into the video).

use crate::models::{
    ClientCapabilities, MediaSourceFacts, MediaStream, StreamKind, SubtitleDeliveryMethod,
    SubtitlePlan,
};

use super::conditions::list_contains;

/// Text-based subtitle codecs convertible between formats.
const TEXT_CODECS: &[&str] = &["srt", "subrip", "ass", "ssa", "vtt", "webvtt", "mov_text"];

#[must_use]
pub fn is_text_codec(codec: &str) -> bool {
    TEXT_CODECS.iter().any(|c| c.eq_ignore_ascii_case(codec))
}

/// Pick the subtitle stream in play: an explicit selection wins, else the
/// default-flagged track.
fn selected_stream<'a>(
    facts: &'a MediaSourceFacts,
    selected: Option<u32>,
) -> Option<&'a MediaStream> {
    match selected {
        Some(index) => facts
            .streams
            .iter()
            .find(|s| s.kind == StreamKind::Subtitle && s.index == index),
        None => facts
            .streams
            .iter()
            .find(|s| s.kind == StreamKind::Subtitle && s.is_default),
    }
}

/// Resolve delivery for the subtitle stream in play, if any.
///
/// Profiles are tried in declaration order. A text source can be converted
/// to any text target; an image source can only be embedded or burned in.
/// When a stream is selected but no profile matches, it is burned in.
#[must_use]
pub fn resolve(
    facts: &MediaSourceFacts,
    caps: &ClientCapabilities,
    selected: Option<u32>,
) -> Option<SubtitlePlan> {
    let stream = selected_stream(facts, selected)?;
    let text_source = is_text_codec(&stream.codec);

    for profile in &caps.subtitle_profiles {
        if let Some(languages) = &profile.language {
            let matches = stream
                .language
                .as_deref()
                .is_some_and(|lang| list_contains(languages, lang));
            if !matches {
                continue;
            }
        }

        match profile.method {
            SubtitleDeliveryMethod::External => {
                let convertible =
                    text_source && is_text_codec(&profile.format) || format_matches(stream, profile);
                if !convertible {
                    continue;
                }
                return Some(SubtitlePlan {
                    stream_index: stream.index,
                    method: SubtitleDeliveryMethod::External,
                    format: profile.format.clone(),
                    url: Some(external_url(facts, stream.index, &profile.format)),
                });
            }
            SubtitleDeliveryMethod::Embed => {
                if !(format_matches(stream, profile) || text_source) {
                    continue;
                }
                return Some(SubtitlePlan {
                    stream_index: stream.index,
                    method: SubtitleDeliveryMethod::Embed,
                    format: stream.codec.clone(),
                    url: None,
                });
            }
            SubtitleDeliveryMethod::Encode => {
                if !format_matches(stream, profile) {
                    continue;
                }
                return Some(SubtitlePlan {
                    stream_index: stream.index,
                    method: SubtitleDeliveryMethod::Encode,
                    format: stream.codec.clone(),
                    url: None,
                });
            }
        }
    }

    // A selected track must reach the screen one way or another.
    Some(SubtitlePlan {
        stream_index: stream.index,
        method: SubtitleDeliveryMethod::Encode,
        format: stream.codec.clone(),
        url: None,
    })
}

fn format_matches(stream: &MediaStream, profile: &crate::models::SubtitleProfile) -> bool {
    profile.format.eq_ignore_ascii_case(&stream.codec)
}

fn external_url(facts: &MediaSourceFacts, stream_index: u32, format: &str) -> String {
    format!(
        "/stream/subtitle/part/{}/stream/{}/stream.{}",
        facts.part.id, stream_index, format
    )
}
