//! Subtitle extraction, conversion, and segmented WebVTT delivery.
//!
//! Text subtitle tracks are extracted once per (part, stream) through the
//! external toolchain and cached next to the transcode outputs. Requests
//! then window and reformat the cached cues: whole-file sidecars, HLS
//! playlist segments with tick-bounded windows, and the `X-TIMESTAMP-MAP`
//! header line for HLS alignment.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::Stdio;

use nexa_core::config::TranscodeConfig;
use nexa_core::models::MediaPart;
use nexa_core::{Error, Result};

/// 100-nanosecond ticks per millisecond, the wire unit of subtitle
/// windows.
pub const TICKS_PER_MS: u64 = 10_000;

const VTT_TIME_MAP: &str = "X-TIMESTAMP-MAP=MPEGTS:900000,LOCAL:00:00:00.000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleCue {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

#[derive(Clone)]
pub struct SubtitleService {
    config: TranscodeConfig,
}

impl SubtitleService {
    #[must_use]
    pub fn new(config: TranscodeConfig) -> Self {
        Self { config }
    }

    /// Deliver one subtitle stream as `vtt`, `srt`, or `ass`, optionally
    /// windowed by `[start_ticks, end_ticks)`.
    pub async fn subtitle(
        &self,
        part: &MediaPart,
        stream_index: u32,
        format: &str,
        start_ticks: Option<u64>,
        end_ticks: Option<u64>,
        add_vtt_time_map: bool,
    ) -> Result<String> {
        match format {
            "vtt" | "srt" => {
                let source = self.extract(part, stream_index, "srt").await?;
                let raw = tokio::fs::read_to_string(&source)
                    .await
                    .map_err(|e| Error::Internal(format!("read extracted subtitles: {e}")))?;
                let cues = parse_srt(&raw);
                let cues = window_cues(
                    &cues,
                    start_ticks.map_or(0, |t| t / TICKS_PER_MS),
                    end_ticks.map(|t| t / TICKS_PER_MS),
                );
                Ok(match format {
                    "vtt" => format_vtt(&cues, add_vtt_time_map),
                    _ => format_srt(&cues),
                })
            }
            "ass" => {
                let source = self.extract(part, stream_index, "ass").await?;
                tokio::fs::read_to_string(&source)
                    .await
                    .map_err(|e| Error::Internal(format!("read extracted subtitles: {e}")))
            }
            other => Err(Error::InvalidInput(format!(
                "unsupported subtitle format: {other}"
            ))),
        }
    }

    /// VOD HLS playlist of subtitle segments for one stream.
    pub async fn playlist(
        &self,
        part: &MediaPart,
        _stream_index: u32,
        segment_length_seconds: u64,
    ) -> Result<String> {
        if segment_length_seconds == 0 {
            return Err(Error::InvalidInput(
                "segmentLength must be positive".to_string(),
            ));
        }
        Ok(build_subtitle_playlist(
            part.duration_ms,
            segment_length_seconds,
        ))
    }

    /// Extract a stream into the cache, converting to `target` ("srt" or
    /// "ass"). Idempotent per (part, stream, target).
    async fn extract(&self, part: &MediaPart, stream_index: u32, target: &str) -> Result<PathBuf> {
        let dir = PathBuf::from(&self.config.root_dir)
            .join("subtitles")
            .join(part.id.as_str());
        let path = dir.join(format!("{stream_index}.{target}"));

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path);
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Internal(format!("subtitle cache: {e}")))?;

        let muxer = match target {
            "ass" => "ass",
            _ => "srt",
        };
        let status = tokio::process::Command::new(&self.config.ffmpeg_path)
            .args([
                "-y",
                "-loglevel",
                "error",
                "-i",
                &part.path,
                "-map",
                &format!("0:{stream_index}"),
                "-f",
                muxer,
            ])
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::EncoderFailed(format!("subtitle extraction spawn: {e}")))?;

        if !status.success() {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(Error::EncoderFailed(format!(
                "subtitle extraction exited with {status}"
            )));
        }
        Ok(path)
    }
}

/// Parse SubRip text into cues. Tolerates missing index lines and CRLF.
#[must_use]
pub fn parse_srt(input: &str) -> Vec<SubtitleCue> {
    let mut cues = Vec::new();
    let mut lines = input.lines().peekable();

    while let Some(line) = lines.next() {
        let line = line.trim_end_matches('\r').trim();
        if line.is_empty() {
            continue;
        }
        // Index line is optional; the timing line is the anchor
        let timing = if line.contains("-->") {
            line.to_string()
        } else {
            match lines.next() {
                Some(next) if next.contains("-->") => next.trim().to_string(),
                _ => continue,
            }
        };

        let Some((start, end)) = parse_timing_line(&timing) else {
            continue;
        };

        let mut text_lines = Vec::new();
        for text in lines.by_ref() {
            let text = text.trim_end_matches('\r');
            if text.trim().is_empty() {
                break;
            }
            text_lines.push(text.to_string());
        }

        cues.push(SubtitleCue {
            start_ms: start,
            end_ms: end,
            text: text_lines.join("\n"),
        });
    }
    cues
}

fn parse_timing_line(line: &str) -> Option<(u64, u64)> {
    let (start, end) = line.split_once("-->")?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end.trim())?))
}

/// `HH:MM:SS,mmm` or `HH:MM:SS.mmm` (hours optional).
fn parse_timestamp(value: &str) -> Option<u64> {
    let value = value.split_whitespace().next()?;
    let (clock, millis) = value
        .split_once(',')
        .or_else(|| value.split_once('.'))
        .unwrap_or((value, "0"));
    let millis: u64 = millis.parse().ok()?;

    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds): (u64, u64, u64) = match parts.as_slice() {
        [h, m, s] => (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?),
        [m, s] => (0u64, m.parse().ok()?, s.parse().ok()?),
        _ => return None,
    };
    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

/// Cues overlapping `[start_ms, end_ms)`.
#[must_use]
pub fn window_cues(cues: &[SubtitleCue], start_ms: u64, end_ms: Option<u64>) -> Vec<SubtitleCue> {
    cues.iter()
        .filter(|cue| cue.end_ms > start_ms && end_ms.is_none_or(|end| cue.start_ms < end))
        .cloned()
        .collect()
}

#[must_use]
pub fn format_vtt(cues: &[SubtitleCue], add_time_map: bool) -> String {
    let mut out = String::from("WEBVTT\n");
    if add_time_map {
        out.push_str(VTT_TIME_MAP);
        out.push('\n');
    }
    out.push('\n');
    for cue in cues {
        let _ = writeln!(
            out,
            "{} --> {}",
            vtt_timestamp(cue.start_ms),
            vtt_timestamp(cue.end_ms)
        );
        out.push_str(&cue.text);
        out.push_str("\n\n");
    }
    out
}

#[must_use]
pub fn format_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            srt_timestamp(cue.start_ms),
            srt_timestamp(cue.end_ms)
        );
        out.push_str(&cue.text);
        out.push_str("\n\n");
    }
    out
}

fn vtt_timestamp(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

fn srt_timestamp(ms: u64) -> String {
    format!(
        "{:02}:{:02}:{:02},{:03}",
        ms / 3_600_000,
        (ms / 60_000) % 60,
        (ms / 1000) % 60,
        ms % 1000
    )
}

/// VOD playlist covering `duration_ms` in `segment_length_seconds` slices.
/// Every `#EXTINF` carries the actual slice duration to three decimals and
/// points back at the windowed `stream.vtt`.
#[must_use]
pub fn build_subtitle_playlist(duration_ms: u64, segment_length_seconds: u64) -> String {
    let segment_ms = segment_length_seconds * 1000;
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    let _ = writeln!(out, "#EXT-X-TARGETDURATION:{segment_length_seconds}");
    out.push_str("#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-PLAYLIST-TYPE:VOD\n");

    let mut position = 0u64;
    while position < duration_ms {
        let end = (position + segment_ms).min(duration_ms);
        let length_ms = end - position;
        let _ = writeln!(
            out,
            "#EXTINF:{}.{:03},",
            length_ms / 1000,
            length_ms % 1000
        );
        let _ = writeln!(
            out,
            "stream.vtt?startPositionTicks={}&endPositionTicks={}&addVttTimeMap=true",
            position * TICKS_PER_MS,
            end * TICKS_PER_MS
        );
        position = end;
    }
    out.push_str("#EXT-X-ENDLIST\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SRT: &str = "1\n00:00:01,000 --> 00:00:04,000\nFirst line\n\n2\n00:00:05,500 --> 00:00:07,250\nSecond line\nwith a wrap\n\n";

    #[test]
    fn test_parse_srt() {
        let cues = parse_srt(SAMPLE_SRT);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_ms, 1000);
        assert_eq!(cues[0].end_ms, 4000);
        assert_eq!(cues[1].text, "Second line\nwith a wrap");
    }

    #[test]
    fn test_parse_srt_without_index_lines() {
        let cues = parse_srt("00:00:01,000 --> 00:00:02,000\nBare cue\n\n");
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Bare cue");
    }

    #[test]
    fn test_vtt_output_and_time_map() {
        let cues = parse_srt(SAMPLE_SRT);
        let vtt = format_vtt(&cues, false);
        assert!(vtt.starts_with("WEBVTT\n\n"));
        assert!(vtt.contains("00:00:01.000 --> 00:00:04.000"));

        let mapped = format_vtt(&cues, true);
        let mut lines = mapped.lines();
        assert_eq!(lines.next(), Some("WEBVTT"));
        assert_eq!(
            lines.next(),
            Some("X-TIMESTAMP-MAP=MPEGTS:900000,LOCAL:00:00:00.000")
        );
    }

    #[test]
    fn test_srt_roundtrip() {
        let cues = parse_srt(SAMPLE_SRT);
        let srt = format_srt(&cues);
        assert_eq!(parse_srt(&srt), cues);
    }

    #[test]
    fn test_window_cues() {
        let cues = parse_srt(SAMPLE_SRT);
        // Window covering only the first cue
        let windowed = window_cues(&cues, 0, Some(5000));
        assert_eq!(windowed.len(), 1);
        // Window starting mid-first-cue still includes it
        let windowed = window_cues(&cues, 3000, None);
        assert_eq!(windowed.len(), 2);
        // Past everything
        assert!(window_cues(&cues, 8000, None).is_empty());
    }

    #[test]
    fn test_playlist_durations_sum_to_media_duration() {
        let duration_ms = 125_500;
        let playlist = build_subtitle_playlist(duration_ms, 60);

        let mut total_ms = 0u64;
        for line in playlist.lines() {
            if let Some(value) = line.strip_prefix("#EXTINF:") {
                let value = value.trim_end_matches(',');
                let (secs, millis) = value.split_once('.').unwrap();
                total_ms += secs.parse::<u64>().unwrap() * 1000 + millis.parse::<u64>().unwrap();
            }
        }
        assert_eq!(total_ms, duration_ms);

        // Last segment's end position equals the total duration in ticks
        let last_uri = playlist
            .lines()
            .filter(|l| l.starts_with("stream.vtt"))
            .next_back()
            .unwrap();
        assert!(last_uri.contains(&format!("endPositionTicks={}", duration_ms * TICKS_PER_MS)));

        assert!(playlist.starts_with("#EXTM3U"));
        assert!(playlist.ends_with("#EXT-X-ENDLIST\n"));
        assert!(playlist.contains("#EXT-X-PLAYLIST-TYPE:VOD"));
    }

    #[test]
    fn test_playlist_segment_count() {
        let playlist = build_subtitle_playlist(125_500, 60);
        let segments = playlist
            .lines()
            .filter(|l| l.starts_with("#EXTINF"))
            .count();
        // 60s + 60s + 5.5s
        assert_eq!(segments, 3);
        assert!(playlist.contains("#EXTINF:5.500,"));
    }
}
