//! Encoder workers.
//!
//! One worker per job. The production worker drives an external ffmpeg
//! process that writes an init segment plus numbered segments into the
//! job's directory and exits on its stop signal or end-of-input. The
//! manager never parses encoder output; progress is observed through the
//! files that appear.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use nexa_core::models::{MediaPart, StreamPlan, StreamProtocol};
use nexa_core::{Error, Result};

use crate::segment::parse_segment_index;

/// Everything a worker needs to produce one variant of one part.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub input_path: String,
    pub output_dir: PathBuf,
    pub protocol: StreamProtocol,
    pub segment_duration_seconds: u32,
    pub copy_video: bool,
    pub copy_audio: bool,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub video_stream_index: Option<u32>,
    pub audio_stream_index: Option<u32>,
    pub target_bitrate: Option<u64>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
    pub target_audio_channels: Option<u32>,
    pub enable_tone_mapping: bool,
    pub use_hardware_acceleration: bool,
    pub burn_in_subtitle_index: Option<u32>,
}

impl WorkerSpec {
    #[must_use]
    pub fn from_plan(
        part: &MediaPart,
        plan: &StreamPlan,
        output_dir: PathBuf,
        segment_duration_seconds: u32,
    ) -> Self {
        let burn_in = plan.subtitle.as_ref().and_then(|s| {
            (s.method == nexa_core::models::SubtitleDeliveryMethod::Encode)
                .then_some(s.stream_index)
        });
        Self {
            input_path: part.path.clone(),
            output_dir,
            protocol: plan.protocol,
            segment_duration_seconds,
            copy_video: plan.copy_video,
            copy_audio: plan.copy_audio,
            video_codec: plan.video_codec.clone(),
            audio_codec: plan.audio_codec.clone(),
            video_stream_index: plan.video_stream_index,
            audio_stream_index: plan.audio_stream_index,
            target_bitrate: plan.target_bitrate,
            target_width: plan.target_width,
            target_height: plan.target_height,
            target_audio_channels: plan.target_audio_channels,
            enable_tone_mapping: plan.enable_tone_mapping,
            use_hardware_acceleration: plan.use_hardware_acceleration,
            burn_in_subtitle_index: burn_in,
        }
    }

    /// The manifest file this worker writes.
    #[must_use]
    pub fn manifest_name(&self) -> &'static str {
        match self.protocol {
            StreamProtocol::Hls => "main.m3u8",
            _ => "manifest.mpd",
        }
    }
}

/// One encoder worker. Start may be called again after stop (seek
/// restart); implementations reset their progress watermark.
#[async_trait]
pub trait SegmentWorker: Send + Sync {
    /// Begin producing segments from `from_ms`, numbering them starting at
    /// `first_segment_index`.
    async fn start(&self, from_ms: u64, first_segment_index: u64) -> Result<()>;

    /// Signal the worker to stop. Exit is asynchronous but bounded; after
    /// the grace period the process is killed.
    async fn stop(&self);

    /// Segment index the encoder is currently producing, `None` when
    /// unknown (not started, or stopped).
    fn current_segment_index(&self) -> Option<u64>;

    /// Whether the encoder exited abnormally.
    fn has_failed(&self) -> bool;
}

/// Creates workers for the manager. The indirection keeps the manager
/// testable without a real encoder on the machine.
pub trait WorkerFactory: Send + Sync {
    fn create(&self, spec: WorkerSpec) -> Arc<dyn SegmentWorker>;
}

pub struct FfmpegWorkerFactory {
    ffmpeg_path: String,
    stop_grace: Duration,
}

impl FfmpegWorkerFactory {
    #[must_use]
    pub fn new(ffmpeg_path: String, stop_grace: Duration) -> Self {
        Self {
            ffmpeg_path,
            stop_grace,
        }
    }
}

impl WorkerFactory for FfmpegWorkerFactory {
    fn create(&self, spec: WorkerSpec) -> Arc<dyn SegmentWorker> {
        Arc::new(FfmpegWorker {
            spec,
            ffmpeg_path: self.ffmpeg_path.clone(),
            stop_grace: self.stop_grace,
            cancel: parking_lot::Mutex::new(None),
            current_segment: Arc::new(AtomicI64::new(-1)),
            failed: Arc::new(AtomicBool::new(false)),
        })
    }
}

pub struct FfmpegWorker {
    spec: WorkerSpec,
    ffmpeg_path: String,
    stop_grace: Duration,
    cancel: parking_lot::Mutex<Option<CancellationToken>>,
    /// -1 = unknown.
    current_segment: Arc<AtomicI64>,
    failed: Arc<AtomicBool>,
}

#[async_trait]
impl SegmentWorker for FfmpegWorker {
    async fn start(&self, from_ms: u64, first_segment_index: u64) -> Result<()> {
        // Stop a previous incarnation before reusing the directory.
        self.stop().await;

        let args = build_ffmpeg_args(&self.spec, from_ms, first_segment_index);
        tracing::debug!(
            output_dir = %self.spec.output_dir.display(),
            from_ms,
            first_segment_index,
            "starting encoder"
        );

        let mut child = tokio::process::Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::EncoderFailed(format!("failed to spawn encoder: {e}")))?;

        self.failed.store(false, Ordering::SeqCst);
        self.current_segment
            .store(first_segment_index as i64, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        *self.cancel.lock() = Some(cancel.clone());

        let current = Arc::clone(&self.current_segment);
        let failed = Arc::clone(&self.failed);
        let output_dir = self.spec.output_dir.clone();
        let stop_grace = self.stop_grace;
        let first = first_segment_index;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(500));
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        let graceful = tokio::time::timeout(stop_grace, child.wait()).await;
                        if graceful.is_err() {
                            let _ = child.kill().await;
                        }
                        current.store(-1, Ordering::SeqCst);
                        return;
                    }
                    status = child.wait() => {
                        match status {
                            Ok(status) if status.success() => {
                                tracing::debug!(
                                    output_dir = %output_dir.display(),
                                    "encoder finished"
                                );
                            }
                            Ok(status) => {
                                tracing::warn!(
                                    output_dir = %output_dir.display(),
                                    code = status.code(),
                                    "encoder exited abnormally"
                                );
                                failed.store(true, Ordering::SeqCst);
                            }
                            Err(e) => {
                                tracing::warn!(
                                    output_dir = %output_dir.display(),
                                    error = %e,
                                    "encoder wait failed"
                                );
                                failed.store(true, Ordering::SeqCst);
                            }
                        }
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Some(highest) = highest_segment_index(&output_dir).await {
                            current.store((highest + 1).max(first) as i64, Ordering::SeqCst);
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
    }

    fn current_segment_index(&self) -> Option<u64> {
        let value = self.current_segment.load(Ordering::SeqCst);
        (value >= 0).then_some(value as u64)
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Highest media-segment index present in the directory.
async fn highest_segment_index(dir: &Path) -> Option<u64> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut highest: Option<u64> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with("chunk-") {
            continue;
        }
        if let Some(index) = parse_segment_index(name) {
            highest = Some(highest.map_or(index, |h| h.max(index)));
        }
    }
    highest
}

/// Assemble the encoder invocation. Pure so the mapping from plan to
/// command line is testable.
#[must_use]
pub fn build_ffmpeg_args(spec: &WorkerSpec, from_ms: u64, first_segment_index: u64) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];

    if spec.use_hardware_acceleration && !spec.copy_video {
        args.extend(["-hwaccel".into(), "auto".into()]);
    }

    if from_ms > 0 {
        args.extend(["-ss".into(), format!("{}.{:03}", from_ms / 1000, from_ms % 1000)]);
    }

    args.extend(["-i".into(), spec.input_path.clone()]);

    if let Some(index) = spec.video_stream_index {
        args.extend(["-map".into(), format!("0:{index}")]);
    }
    if let Some(index) = spec.audio_stream_index {
        args.extend(["-map".into(), format!("0:{index}")]);
    }

    if spec.copy_video {
        args.extend(["-c:v".into(), "copy".into()]);
    } else {
        let codec = spec.video_codec.as_deref().unwrap_or("h264");
        args.extend(["-c:v".into(), video_encoder_for(codec).into()]);
        if let Some(bitrate) = spec.target_bitrate {
            args.extend(["-b:v".into(), bitrate.to_string()]);
            args.extend(["-maxrate".into(), bitrate.to_string()]);
            args.extend(["-bufsize".into(), (bitrate * 2).to_string()]);
        }
        let mut filters: Vec<String> = Vec::new();
        if let (Some(width), Some(height)) = (spec.target_width, spec.target_height) {
            filters.push(format!("scale={width}:{height}"));
        }
        if spec.enable_tone_mapping {
            filters.push(
                "zscale=t=linear:npl=100,tonemap=hable:desat=0,zscale=p=bt709:t=bt709:m=bt709"
                    .to_string(),
            );
        }
        if let Some(index) = spec.burn_in_subtitle_index {
            filters.push(format!(
                "subtitles={}:si={index}",
                escape_filter_path(&spec.input_path)
            ));
        }
        if !filters.is_empty() {
            args.extend(["-vf".into(), filters.join(",")]);
        }
        // Keyframes on segment boundaries so every segment starts decodable
        args.extend([
            "-force_key_frames".into(),
            format!("expr:gte(t,n_forced*{})", spec.segment_duration_seconds),
        ]);
    }

    if spec.copy_audio {
        args.extend(["-c:a".into(), "copy".into()]);
    } else {
        let codec = spec.audio_codec.as_deref().unwrap_or("aac");
        args.extend(["-c:a".into(), codec.to_string()]);
        if let Some(channels) = spec.target_audio_channels {
            args.extend(["-ac".into(), channels.to_string()]);
        }
    }

    match spec.protocol {
        StreamProtocol::Hls => {
            args.extend([
                "-f".into(),
                "hls".into(),
                "-hls_segment_type".into(),
                "fmp4".into(),
                "-hls_time".into(),
                spec.segment_duration_seconds.to_string(),
                "-hls_playlist_type".into(),
                "event".into(),
                "-start_number".into(),
                first_segment_index.to_string(),
                "-hls_fmp4_init_filename".into(),
                "init-stream0.mp4".into(),
                "-hls_segment_filename".into(),
                spec.output_dir
                    .join("chunk-stream0-%05d.m4s")
                    .to_string_lossy()
                    .into_owned(),
            ]);
            args.push(spec.output_dir.join("main.m3u8").to_string_lossy().into_owned());
        }
        _ => {
            args.extend([
                "-f".into(),
                "dash".into(),
                "-seg_duration".into(),
                spec.segment_duration_seconds.to_string(),
                "-use_template".into(),
                "1".into(),
                "-use_timeline".into(),
                "0".into(),
                "-start_number".into(),
                first_segment_index.to_string(),
                "-init_seg_name".into(),
                "init-stream$RepresentationID$.mp4".into(),
                "-media_seg_name".into(),
                "chunk-stream$RepresentationID$-$Number%05d$.m4s".into(),
            ]);
            args.push(
                spec.output_dir
                    .join("manifest.mpd")
                    .to_string_lossy()
                    .into_owned(),
            );
        }
    }

    args
}

fn video_encoder_for(codec: &str) -> &'static str {
    match codec {
        "hevc" | "h265" => "libx265",
        "vp9" => "libvpx-vp9",
        "av1" => "libsvtav1",
        _ => "libx264",
    }
}

fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "\\\\").replace(':', "\\:").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> WorkerSpec {
        WorkerSpec {
            input_path: "/library/film.mkv".to_string(),
            output_dir: PathBuf::from("/tmp/transcodes/p/v"),
            protocol: StreamProtocol::Dash,
            segment_duration_seconds: 4,
            copy_video: false,
            copy_audio: false,
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
            video_stream_index: Some(0),
            audio_stream_index: Some(1),
            target_bitrate: Some(20_000_000),
            target_width: Some(1920),
            target_height: Some(1080),
            target_audio_channels: Some(2),
            enable_tone_mapping: false,
            use_hardware_acceleration: false,
            burn_in_subtitle_index: None,
        }
    }

    #[test]
    fn test_seek_adds_input_seeking() {
        let args = build_ffmpeg_args(&spec(), 12_500, 3);
        let joined = args.join(" ");
        assert!(joined.contains("-ss 12.500"));
        assert!(joined.contains("-start_number 3"));

        let args = build_ffmpeg_args(&spec(), 0, 0);
        assert!(!args.join(" ").contains("-ss"));
    }

    #[test]
    fn test_copy_streams_use_copy_codecs() {
        let mut spec = spec();
        spec.copy_video = true;
        spec.copy_audio = true;
        let joined = build_ffmpeg_args(&spec, 0, 0).join(" ");
        assert!(joined.contains("-c:v copy"));
        assert!(joined.contains("-c:a copy"));
        assert!(!joined.contains("-b:v"));
        assert!(!joined.contains("scale="));
    }

    #[test]
    fn test_transcode_applies_targets() {
        let joined = build_ffmpeg_args(&spec(), 0, 0).join(" ");
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 20000000"));
        assert!(joined.contains("scale=1920:1080"));
        assert!(joined.contains("-ac 2"));
        assert!(joined.contains("-seg_duration 4"));
        assert!(joined.ends_with("manifest.mpd"));
    }

    #[test]
    fn test_tone_mapping_filter() {
        let mut spec = spec();
        spec.enable_tone_mapping = true;
        let joined = build_ffmpeg_args(&spec, 0, 0).join(" ");
        assert!(joined.contains("tonemap=hable"));
    }

    #[test]
    fn test_hls_output_naming() {
        let mut spec = spec();
        spec.protocol = StreamProtocol::Hls;
        let joined = build_ffmpeg_args(&spec, 0, 5).join(" ");
        assert!(joined.contains("-f hls"));
        assert!(joined.contains("-start_number 5"));
        assert!(joined.ends_with("main.m3u8"));
    }

    #[tokio::test]
    async fn test_highest_segment_index_scans_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(highest_segment_index(dir.path()).await, None);

        for name in [
            "init-stream0.mp4",
            "chunk-stream0-00001.m4s",
            "chunk-stream0-00007.m4s",
            "chunk-stream0-00003.m4s",
            "manifest.mpd",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        assert_eq!(highest_segment_index(dir.path()).await, Some(7));
    }
}
