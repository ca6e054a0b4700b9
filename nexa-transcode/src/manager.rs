//! The transcode job manager.
//!
//! Owns the set of live encoder workers, one per (part, variant). Jobs sit
//! in a bounded LRU; eviction stops the worker and removes its directory,
//! but never touches a job pinged within the active window. Segment
//! requests follow the smart-segment policy: restart the encoder when the
//! request is behind it or too far ahead, otherwise wait for the file.

use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use nexa_core::cache::{SingleFlight, SingleFlightError};
use nexa_core::config::TranscodeConfig;
use nexa_core::metrics;
use nexa_core::models::{MediaPart, MediaPartId, SessionId, StreamPlan, TranscodeJobState};
use nexa_core::repository::TranscodeJobRepository;
use nexa_core::service::gop::GopIndexService;
use nexa_core::service::JobStopper;
use nexa_core::{Error, Result};

use crate::job::TranscodeJob;
use crate::segment::{is_init_segment, parse_segment_index, validate_segment_name};
use crate::variant::variant_key;
use crate::worker::{WorkerFactory, WorkerSpec};

/// Delay after a segment file appears before serving it, covering the
/// encoder's write-then-rename window.
const STABILITY_DELAY: Duration = Duration::from_millis(250);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub part_id: MediaPartId,
    pub variant_key: String,
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.part_id, self.variant_key)
    }
}

#[derive(Debug, Clone)]
pub struct ManifestResponse {
    pub path: PathBuf,
    pub content_type: &'static str,
    /// True media offset of the first segment; drives
    /// `X-Dash-Start-Time-Ms` when a seek repositioned the encoder.
    pub start_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SegmentResponse {
    pub path: PathBuf,
    pub content_type: &'static str,
    /// Set when this request restarted the encoder.
    pub start_time_ms: Option<u64>,
}

/// Smart-segment verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentAction {
    RestartAt(u64),
    Wait,
}

/// The decision table. Restart when the encoder position is unknown,
/// when the request is behind it (an encoder cannot rewind), or when the
/// request is further ahead than the threshold; otherwise waiting is
/// cheaper.
#[must_use]
pub fn decide_segment_action(
    requested: u64,
    current: Option<u64>,
    threshold: u64,
) -> SegmentAction {
    match current {
        None => SegmentAction::RestartAt(requested),
        Some(current) if requested < current => SegmentAction::RestartAt(requested),
        Some(current) if requested - current > threshold => SegmentAction::RestartAt(requested),
        _ => SegmentAction::Wait,
    }
}

pub struct TranscodeManager {
    config: TranscodeConfig,
    factory: Arc<dyn WorkerFactory>,
    gop: GopIndexService,
    records: Option<TranscodeJobRepository>,
    jobs: parking_lot::Mutex<LruCache<JobKey, Arc<TranscodeJob>>>,
    creation_locks: DashMap<JobKey, Arc<tokio::sync::Mutex<()>>>,
    restarts: SingleFlight<String, u64, String>,
}

impl TranscodeManager {
    #[must_use]
    pub fn new(
        config: TranscodeConfig,
        factory: Arc<dyn WorkerFactory>,
        gop: GopIndexService,
        records: Option<TranscodeJobRepository>,
    ) -> Self {
        let capacity =
            NonZeroUsize::new(config.max_cached_jobs).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            factory,
            gop,
            records,
            jobs: parking_lot::Mutex::new(LruCache::new(capacity)),
            creation_locks: DashMap::new(),
            restarts: SingleFlight::new(),
        }
    }

    /// Serve the manifest for (part, variant), creating the job on first
    /// use. With `seek_ms > 0` the encoder restarts at the nearest
    /// keyframe and the response reports the true start offset.
    pub async fn manifest(
        &self,
        part: &MediaPart,
        plan: &StreamPlan,
        session_id: &SessionId,
        seek_ms: u64,
    ) -> Result<ManifestResponse> {
        let key = self.key_for(part, plan);
        let job = self.get_or_create(&key, part, plan, session_id).await?;
        job.touch();

        let segment_duration_ms = u64::from(self.config.segment_duration_seconds) * 1000;
        let mut start_time_ms = 0;

        if seek_ms > 0 {
            let lookup = self.gop.nearest_keyframe(&part.id, seek_ms).await?;
            let first_segment = lookup.keyframe_ms / segment_duration_ms;
            self.restart_job(&key, &job, lookup.keyframe_ms, first_segment, true)
                .await?;
            start_time_ms = lookup.keyframe_ms;
        } else if job.state() == TranscodeJobState::Failed {
            // A failed job starts over cleanly on the next manifest fetch
            self.restart_job(&key, &job, 0, 0, true).await?;
        }

        let manifest_name = match plan.protocol {
            nexa_core::models::StreamProtocol::Hls => "main.m3u8",
            _ => "manifest.mpd",
        };
        let path = job.output_dir.join(manifest_name);
        self.wait_for_file(&path).await?;

        Ok(ManifestResponse {
            path,
            content_type: crate::segment::content_type_for(manifest_name),
            start_time_ms,
        })
    }

    /// Serve one segment, applying the smart-segment policy when the file
    /// is not there yet. Creates the job when absent.
    pub async fn segment(
        &self,
        part: &MediaPart,
        plan: &StreamPlan,
        session_id: &SessionId,
        file_name: &str,
    ) -> Result<SegmentResponse> {
        validate_segment_name(file_name)?;
        let key = self.key_for(part, plan);
        let job = self.get_or_create(&key, part, plan, session_id).await?;
        self.serve_segment(&key, &job, file_name).await
    }

    /// Serve a segment against whatever job already exists for the part
    /// (most recently used variant). Used when the request carries no
    /// session context; it never creates a job.
    pub async fn segment_for_part(
        &self,
        part_id: &MediaPartId,
        file_name: &str,
    ) -> Result<SegmentResponse> {
        validate_segment_name(file_name)?;
        let found = {
            let jobs = self.jobs.lock();
            jobs.iter()
                .find(|(key, _)| &key.part_id == part_id)
                .map(|(key, job)| (key.clone(), Arc::clone(job)))
        };
        let Some((key, job)) = found else {
            return Err(Error::NotFound(format!(
                "no active transcode for part {part_id}"
            )));
        };
        self.serve_segment(&key, &job, file_name).await
    }

    async fn serve_segment(
        &self,
        key: &JobKey,
        job: &Arc<TranscodeJob>,
        file_name: &str,
    ) -> Result<SegmentResponse> {
        job.touch();

        let path = job.output_dir.join(file_name);
        let content_type = crate::segment::content_type_for(file_name);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            self.touch_entry(key);
            return Ok(SegmentResponse {
                path,
                content_type,
                start_time_ms: None,
            });
        }

        // Init segments and unindexed files carry no restart logic
        let requested = if is_init_segment(file_name) {
            None
        } else {
            parse_segment_index(file_name)
        };
        let Some(requested) = requested else {
            self.wait_for_file(&path).await?;
            return Ok(SegmentResponse {
                path,
                content_type,
                start_time_ms: None,
            });
        };

        let mut start_time_ms = None;
        if job.state() != TranscodeJobState::Failed {
            let threshold = self.config.restart_threshold();
            let current = job.current_segment_index();
            if let SegmentAction::RestartAt(first_segment) =
                decide_segment_action(requested, current, threshold)
            {
                let segment_duration_ms =
                    u64::from(self.config.segment_duration_seconds) * 1000;
                let from_ms = first_segment * segment_duration_ms;
                tracing::debug!(
                    job_id = %job.id,
                    requested,
                    ?current,
                    threshold,
                    "segment request repositions encoder"
                );
                self.restart_job(key, job, from_ms, first_segment, false)
                    .await?;
                start_time_ms = Some(from_ms);
            }
        }

        metrics::transcode::SEGMENT_WAITS_TOTAL.inc();
        self.wait_for_file(&path).await?;

        Ok(SegmentResponse {
            path,
            content_type,
            start_time_ms,
        })
    }

    /// Stop and drop every job belonging to a session.
    pub async fn stop_session_jobs(&self, session_id: &SessionId) {
        let victims: Vec<(JobKey, Arc<TranscodeJob>)> = {
            let mut jobs = self.jobs.lock();
            let keys: Vec<JobKey> = jobs
                .iter()
                .filter(|(_, job)| &job.session_id == session_id)
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| jobs.pop(&key).map(|job| (key, job)))
                .collect()
        };

        for (key, job) in victims {
            tracing::info!(job_id = %job.id, %key, "stopping job for session teardown");
            self.teardown(job).await;
        }
    }

    fn key_for(&self, part: &MediaPart, plan: &StreamPlan) -> JobKey {
        JobKey {
            part_id: part.id.clone(),
            variant_key: variant_key(plan),
        }
    }

    fn touch_entry(&self, key: &JobKey) {
        // Promote in LRU order
        let _ = self.jobs.lock().get(key);
    }

    /// Double-checked get-or-create under a per-key creation lock, so
    /// concurrent first requests build one job.
    async fn get_or_create(
        &self,
        key: &JobKey,
        part: &MediaPart,
        plan: &StreamPlan,
        session_id: &SessionId,
    ) -> Result<Arc<TranscodeJob>> {
        if let Some(job) = self.jobs.lock().get(key) {
            return Ok(Arc::clone(job));
        }

        let lock = self
            .creation_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(job) = self.jobs.lock().get(key) {
            return Ok(Arc::clone(job));
        }

        let output_dir = Path::new(&self.config.root_dir)
            .join(part.id.as_str())
            .join(&key.variant_key);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(map_disk_error)?;

        let spec = WorkerSpec::from_plan(
            part,
            plan,
            output_dir,
            self.config.segment_duration_seconds,
        );
        let job = Arc::new(TranscodeJob::new(
            session_id.clone(),
            part.id.clone(),
            key.variant_key.clone(),
            plan.protocol,
            spec.clone(),
        ));

        let worker = self.factory.create(spec);
        worker.start(0, 0).await?;
        job.set_worker(worker);
        job.set_state(TranscodeJobState::Running);

        if let Err(e) = self.insert_job(key.clone(), Arc::clone(&job)).await {
            job.stop_worker().await;
            let _ = tokio::fs::remove_dir_all(&job.output_dir).await;
            return Err(e);
        }
        metrics::transcode::JOBS_ACTIVE.inc();
        self.persist(&job).await;

        tracing::info!(
            job_id = %job.id,
            session_id = %session_id,
            %key,
            "transcode job created"
        );

        Ok(job)
    }

    /// Insert, evicting the least-recently-used inactive entry when full.
    /// All-active caches refuse new jobs instead of killing live ones.
    async fn insert_job(&self, key: JobKey, job: Arc<TranscodeJob>) -> Result<()> {
        let evicted = {
            let mut jobs = self.jobs.lock();
            let mut evicted = None;
            if jobs.len() >= jobs.cap().get() {
                let window = self.config.active_window();
                let mut kept = Vec::new();
                for _ in 0..jobs.len() {
                    let Some((candidate_key, candidate)) = jobs.pop_lru() else {
                        break;
                    };
                    if candidate.is_active_within(window) {
                        kept.push((candidate_key, candidate));
                    } else {
                        evicted = Some((candidate_key, candidate));
                        break;
                    }
                }
                // Skipped-over active entries return in their old order
                for (kept_key, kept_job) in kept.into_iter().rev() {
                    jobs.put(kept_key, kept_job);
                }
                if evicted.is_none() {
                    return Err(Error::ResourceExhausted(
                        "all cached transcode jobs are active".to_string(),
                    ));
                }
            }
            jobs.put(key, job);
            evicted
        };

        if let Some((evicted_key, evicted_job)) = evicted {
            tracing::info!(job_id = %evicted_job.id, key = %evicted_key, "evicting transcode job");
            metrics::transcode::JOBS_EVICTED_TOTAL.inc();
            self.teardown(evicted_job).await;
        }
        Ok(())
    }

    /// Restart a job's worker at a new position. Concurrent restart
    /// decisions for the same key coalesce into one.
    async fn restart_job(
        &self,
        key: &JobKey,
        job: &Arc<TranscodeJob>,
        from_ms: u64,
        first_segment: u64,
        clear_directory: bool,
    ) -> Result<()> {
        let flight_key = key.to_string();
        let job = Arc::clone(job);
        let spec = job.spec();
        let factory = Arc::clone(&self.factory);

        let result = self
            .restarts
            .run(flight_key, async move {
                job.stop_worker().await;
                if clear_directory {
                    if let Err(e) = clear_dir(&job.output_dir).await {
                        return Err(format!("failed to clear job directory: {e}"));
                    }
                }

                let worker = factory.create(spec);
                worker
                    .start(from_ms, first_segment)
                    .await
                    .map_err(|e| e.to_string())?;
                job.set_worker(worker);
                job.set_state(TranscodeJobState::Running);
                metrics::transcode::WORKER_RESTARTS_TOTAL.inc();
                Ok(first_segment)
            })
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(SingleFlightError::Inner(message)) => Err(Error::EncoderFailed(message)),
            Err(SingleFlightError::LeaderFailed) => Err(Error::ConcurrencyConflict(
                "encoder restart was cancelled".to_string(),
            )),
        }
    }

    /// Wait for a file with the configured deadline and a short stability
    /// delay once it appears.
    async fn wait_for_file(&self, path: &Path) -> Result<()> {
        let deadline = self.config.segment_wait();
        let wait = async {
            loop {
                if tokio::fs::try_exists(path).await.unwrap_or(false) {
                    tokio::time::sleep(STABILITY_DELAY).await;
                    return;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };

        if tokio::time::timeout(deadline, wait).await.is_err() {
            metrics::transcode::SEGMENT_WAIT_TIMEOUTS_TOTAL.inc();
            return Err(Error::Timeout(format!(
                "segment {} did not materialize",
                path.display()
            )));
        }
        Ok(())
    }

    async fn teardown(&self, job: Arc<TranscodeJob>) {
        job.stop_worker().await;
        metrics::transcode::JOBS_ACTIVE.dec();
        if let Err(e) = tokio::fs::remove_dir_all(&job.output_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    job_id = %job.id,
                    error = %e,
                    "failed to remove job directory"
                );
            }
        }
        self.persist(&job).await;
    }

    /// Best-effort durable snapshot; a broken record store never blocks
    /// segment delivery.
    async fn persist(&self, job: &TranscodeJob) {
        if let Some(records) = &self.records {
            if let Err(e) = records.upsert(&job.to_record()).await {
                tracing::warn!(job_id = %job.id, error = %e, "job record upsert failed");
            }
        }
    }
}

#[async_trait]
impl JobStopper for TranscodeManager {
    async fn stop_for_session(&self, session_id: &SessionId) {
        self.stop_session_jobs(session_id).await;
    }
}

fn map_disk_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::StorageFull | std::io::ErrorKind::QuotaExceeded => {
            Error::ResourceExhausted(format!("transcode storage: {e}"))
        }
        _ => Error::Internal(format!("transcode storage: {e}")),
    }
}

/// Remove a directory's contents, keeping the directory itself.
async fn clear_dir(dir: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexa_core::catalog::MemoryCatalog;
    use nexa_core::models::{
        ItemId, MediaSourceFacts, PlayMethod, StreamProtocol, TranscodeReasons,
    };
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeWorker {
        output_dir: PathBuf,
        current: Mutex<Option<u64>>,
        starts: Arc<Mutex<Vec<(u64, u64)>>>,
        write_on_start: bool,
        failed: AtomicBool,
    }

    #[async_trait]
    impl crate::worker::SegmentWorker for FakeWorker {
        async fn start(&self, from_ms: u64, first_segment_index: u64) -> Result<()> {
            self.starts.lock().push((from_ms, first_segment_index));
            *self.current.lock() = Some(first_segment_index);
            if self.write_on_start {
                std::fs::create_dir_all(&self.output_dir).ok();
                std::fs::write(self.output_dir.join("manifest.mpd"), b"<MPD/>").unwrap();
                std::fs::write(self.output_dir.join("init-stream0.mp4"), b"init").unwrap();
                std::fs::write(
                    self.output_dir
                        .join(format!("chunk-stream0-{first_segment_index:05}.m4s")),
                    b"seg",
                )
                .unwrap();
            }
            Ok(())
        }

        async fn stop(&self) {}

        fn current_segment_index(&self) -> Option<u64> {
            *self.current.lock()
        }

        fn has_failed(&self) -> bool {
            self.failed.load(Ordering::SeqCst)
        }
    }

    struct FakeFactory {
        starts: Arc<Mutex<Vec<(u64, u64)>>>,
        write_on_start: bool,
        workers: Arc<Mutex<Vec<Arc<FakeWorker>>>>,
    }

    impl crate::worker::WorkerFactory for FakeFactory {
        fn create(&self, spec: WorkerSpec) -> Arc<dyn crate::worker::SegmentWorker> {
            let worker = Arc::new(FakeWorker {
                output_dir: spec.output_dir,
                current: Mutex::new(None),
                starts: Arc::clone(&self.starts),
                write_on_start: self.write_on_start,
                failed: AtomicBool::new(false),
            });
            self.workers.lock().push(Arc::clone(&worker));
            worker
        }
    }

    fn part_with_keyframes() -> MediaPart {
        MediaPart {
            id: MediaPartId::from_string("part00000001".to_string()),
            item_id: ItemId::from_string("item00000001".to_string()),
            path: "/library/film.mkv".to_string(),
            container: "mkv".to_string(),
            duration_ms: 600_000,
            size_bytes: None,
            direct_url: "/parts/part00000001/file.mkv".to_string(),
            keyframes_ms: (0..150).map(|i| i * 4000).collect(),
        }
    }

    fn transcode_plan() -> StreamPlan {
        StreamPlan {
            method: PlayMethod::Transcode,
            protocol: StreamProtocol::Dash,
            part_id: MediaPartId::from_string("part00000001".to_string()),
            container: "mp4".to_string(),
            direct_url: None,
            manifest_url: Some("/stream/part/part00000001/dash/manifest.mpd".to_string()),
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
            target_width: None,
            target_height: None,
            target_audio_channels: Some(2),
            subtitle: None,
        }
    }

    struct Harness {
        manager: TranscodeManager,
        starts: Arc<Mutex<Vec<(u64, u64)>>>,
        workers: Arc<Mutex<Vec<Arc<FakeWorker>>>>,
        _root: tempfile::TempDir,
    }

    fn harness(write_on_start: bool, mutate: impl FnOnce(&mut TranscodeConfig)) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let mut config = TranscodeConfig {
            root_dir: root.path().to_string_lossy().into_owned(),
            segment_duration_seconds: 4,
            segment_wait_seconds: 2,
            ..Default::default()
        };
        mutate(&mut config);

        let starts = Arc::new(Mutex::new(Vec::new()));
        let workers = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(FakeFactory {
            starts: Arc::clone(&starts),
            write_on_start,
            workers: Arc::clone(&workers),
        });

        let catalog = MemoryCatalog::new();
        catalog.insert_facts(MediaSourceFacts {
            item_id: ItemId::from_string("item00000001".to_string()),
            part: part_with_keyframes(),
            streams: vec![],
            bitrate: None,
            trickplay: None,
        });

        Harness {
            manager: TranscodeManager::new(config, factory, GopIndexService::new(catalog), None),
            starts,
            workers,
            _root: root,
        }
    }

    #[test]
    fn test_smart_segment_decision_table() {
        let threshold = 6;
        // Unknown encoder position always restarts
        assert_eq!(
            decide_segment_action(9, None, threshold),
            SegmentAction::RestartAt(9)
        );
        // Behind the encoder: cannot rewind
        assert_eq!(
            decide_segment_action(3, Some(12), threshold),
            SegmentAction::RestartAt(3)
        );
        // Far ahead: restarting beats waiting
        assert_eq!(
            decide_segment_action(30, Some(12), threshold),
            SegmentAction::RestartAt(30)
        );
        // Just ahead: wait
        assert_eq!(decide_segment_action(14, Some(12), threshold), SegmentAction::Wait);
        assert_eq!(decide_segment_action(12, Some(12), threshold), SegmentAction::Wait);
        // Exactly at the threshold still waits
        assert_eq!(decide_segment_action(18, Some(12), threshold), SegmentAction::Wait);
        assert_eq!(
            decide_segment_action(19, Some(12), threshold),
            SegmentAction::RestartAt(19)
        );
    }

    #[tokio::test]
    async fn test_segment_restart_behind() {
        let h = harness(true, |_| {});
        let part = part_with_keyframes();
        let plan = transcode_plan();
        let session = SessionId::new();

        // Create the job, encoder sits at segment 12
        let _ = h
            .manager
            .segment(&part, &plan, &session, "chunk-stream0-00000.m4s")
            .await
            .unwrap();
        *h.workers.lock().last().unwrap().current.lock() = Some(12);
        h.starts.lock().clear();

        let response = h
            .manager
            .segment(&part, &plan, &session, "chunk-stream0-00003.m4s")
            .await
            .unwrap();

        // Restart at 3 → media offset 12 000 ms
        assert_eq!(h.starts.lock().as_slice(), &[(12_000, 3)]);
        assert_eq!(response.start_time_ms, Some(12_000));
    }

    #[tokio::test]
    async fn test_segment_restart_far_ahead() {
        let h = harness(true, |_| {});
        let part = part_with_keyframes();
        let plan = transcode_plan();
        let session = SessionId::new();

        let _ = h
            .manager
            .segment(&part, &plan, &session, "chunk-stream0-00000.m4s")
            .await
            .unwrap();
        *h.workers.lock().last().unwrap().current.lock() = Some(12);
        h.starts.lock().clear();

        let response = h
            .manager
            .segment(&part, &plan, &session, "chunk-stream0-00030.m4s")
            .await
            .unwrap();

        assert_eq!(h.starts.lock().as_slice(), &[(120_000, 30)]);
        assert_eq!(response.start_time_ms, Some(120_000));
    }

    #[tokio::test]
    async fn test_segment_waits_when_just_ahead() {
        let h = harness(true, |_| {});
        let part = part_with_keyframes();
        let plan = transcode_plan();
        let session = SessionId::new();

        let first = h
            .manager
            .segment(&part, &plan, &session, "chunk-stream0-00000.m4s")
            .await
            .unwrap();
        *h.workers.lock().last().unwrap().current.lock() = Some(12);
        h.starts.lock().clear();

        // Writer mimics the encoder catching up
        let pending = first.path.parent().unwrap().join("chunk-stream0-00014.m4s");
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            std::fs::write(pending, b"seg").unwrap();
        });

        let response = h
            .manager
            .segment(&part, &plan, &session, "chunk-stream0-00014.m4s")
            .await
            .unwrap();
        writer.await.unwrap();

        assert!(h.starts.lock().is_empty());
        assert_eq!(response.start_time_ms, None);
    }

    #[tokio::test]
    async fn test_segment_wait_times_out() {
        let h = harness(true, |c| c.segment_wait_seconds = 1);
        let part = part_with_keyframes();
        let plan = transcode_plan();
        let session = SessionId::new();

        let _ = h
            .manager
            .segment(&part, &plan, &session, "chunk-stream0-00000.m4s")
            .await
            .unwrap();
        *h.workers.lock().last().unwrap().current.lock() = Some(12);

        let result = h
            .manager
            .segment(&part, &plan, &session, "chunk-stream0-00014.m4s")
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let h = harness(true, |_| {});
        let part = part_with_keyframes();
        let plan = transcode_plan();
        let session = SessionId::new();

        let result = h
            .manager
            .segment(&part, &plan, &session, "../../../etc/passwd")
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_manifest_seek_restarts_at_keyframe() {
        let h = harness(true, |_| {});
        let part = part_with_keyframes();
        let plan = transcode_plan();
        let session = SessionId::new();

        let response = h
            .manager
            .manifest(&part, &plan, &session, 13_500)
            .await
            .unwrap();

        // Keyframe 12 000 → segment 3
        assert_eq!(response.start_time_ms, 12_000);
        let starts = h.starts.lock().clone();
        assert_eq!(starts.last(), Some(&(12_000, 3)));
    }

    #[tokio::test]
    async fn test_lru_eviction_skips_active_jobs() {
        let h = harness(true, |c| {
            c.max_cached_jobs = 1;
            c.active_window_seconds = 3600;
        });
        let part_a = part_with_keyframes();
        let mut part_b = part_with_keyframes();
        part_b.id = MediaPartId::from_string("part00000002".to_string());
        let plan = transcode_plan();
        let session = SessionId::new();

        let _ = h
            .manager
            .manifest(&part_a, &plan, &session, 0)
            .await
            .unwrap();

        // The only slot is held by a recently pinged job
        let result = h.manager.manifest(&part_b, &plan, &session, 0).await;
        assert!(matches!(result, Err(Error::ResourceExhausted(_))));
    }

    #[tokio::test]
    async fn test_lru_evicts_inactive_job() {
        let h = harness(true, |c| {
            c.max_cached_jobs = 1;
            c.active_window_seconds = 0;
        });
        let part_a = part_with_keyframes();
        let mut part_b = part_with_keyframes();
        part_b.id = MediaPartId::from_string("part00000002".to_string());
        let plan = transcode_plan();
        let session = SessionId::new();

        let first = h
            .manager
            .manifest(&part_a, &plan, &session, 0)
            .await
            .unwrap();
        let second = h.manager.manifest(&part_b, &plan, &session, 0).await;
        assert!(second.is_ok());
        // The evicted job's directory is gone
        assert!(!first.path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn test_segment_for_part_requires_existing_job() {
        let h = harness(true, |_| {});
        let part = part_with_keyframes();
        let plan = transcode_plan();
        let session = SessionId::new();

        // No job yet: sessionless segment requests cannot create one
        let result = h
            .manager
            .segment_for_part(&part.id, "chunk-stream0-00000.m4s")
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let _ = h.manager.manifest(&part, &plan, &session, 0).await.unwrap();
        let response = h
            .manager
            .segment_for_part(&part.id, "chunk-stream0-00000.m4s")
            .await
            .unwrap();
        assert!(response.path.ends_with("chunk-stream0-00000.m4s"));
    }

    #[tokio::test]
    async fn test_stop_session_jobs_drops_only_that_session() {
        let h = harness(true, |_| {});
        let part_a = part_with_keyframes();
        let mut part_b = part_with_keyframes();
        part_b.id = MediaPartId::from_string("part00000002".to_string());
        let plan = transcode_plan();
        let session_a = SessionId::new();
        let session_b = SessionId::new();

        let a = h
            .manager
            .manifest(&part_a, &plan, &session_a, 0)
            .await
            .unwrap();
        let b = h
            .manager
            .manifest(&part_b, &plan, &session_b, 0)
            .await
            .unwrap();

        h.manager.stop_session_jobs(&session_a).await;
        assert!(!a.path.parent().unwrap().exists());
        assert!(b.path.parent().unwrap().exists());
    }
}
