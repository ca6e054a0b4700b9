//! Live transcode job state.
//!
//! A job owns its output directory for its whole lifetime and holds the
//! worker producing into it. Restarts replace the worker but keep the job
//! (and its LRU slot and watchpoint) alive.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use nexa_core::models::{
    JobId, MediaPartId, SessionId, StreamProtocol, TranscodeJobRecord, TranscodeJobState,
};

use crate::worker::{SegmentWorker, WorkerSpec};

pub struct TranscodeJob {
    pub id: JobId,
    pub session_id: SessionId,
    pub part_id: MediaPartId,
    pub variant_key: String,
    pub protocol: StreamProtocol,
    pub output_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Worker parameters, kept so restarts need no replanning.
    spec: WorkerSpec,
    state: parking_lot::Mutex<TranscodeJobState>,
    last_ping: parking_lot::Mutex<Instant>,
    error: parking_lot::Mutex<Option<String>>,
    worker: parking_lot::Mutex<Option<Arc<dyn SegmentWorker>>>,
}

impl TranscodeJob {
    #[must_use]
    pub fn new(
        session_id: SessionId,
        part_id: MediaPartId,
        variant_key: String,
        protocol: StreamProtocol,
        spec: WorkerSpec,
    ) -> Self {
        Self {
            id: JobId::new(),
            session_id,
            part_id,
            variant_key,
            protocol,
            output_dir: spec.output_dir.clone(),
            created_at: Utc::now(),
            spec,
            state: parking_lot::Mutex::new(TranscodeJobState::Starting),
            last_ping: parking_lot::Mutex::new(Instant::now()),
            error: parking_lot::Mutex::new(None),
            worker: parking_lot::Mutex::new(None),
        }
    }

    #[must_use]
    pub fn spec(&self) -> WorkerSpec {
        self.spec.clone()
    }

    #[must_use]
    pub fn state(&self) -> TranscodeJobState {
        // A crashed worker surfaces as Failed on the next observation
        let failed = self
            .worker
            .lock()
            .as_ref()
            .is_some_and(|worker| worker.has_failed());
        if failed {
            *self.state.lock() = TranscodeJobState::Failed;
        }
        *self.state.lock()
    }

    pub fn set_state(&self, state: TranscodeJobState) {
        *self.state.lock() = state;
    }

    pub fn set_error(&self, message: impl Into<String>) {
        *self.error.lock() = Some(message.into());
        self.set_state(TranscodeJobState::Failed);
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    /// Refresh the activity watermark; active jobs are never evicted.
    pub fn touch(&self) {
        *self.last_ping.lock() = Instant::now();
    }

    #[must_use]
    pub fn last_ping(&self) -> Instant {
        *self.last_ping.lock()
    }

    #[must_use]
    pub fn is_active_within(&self, window: std::time::Duration) -> bool {
        self.last_ping.lock().elapsed() < window
    }

    pub fn set_worker(&self, worker: Arc<dyn SegmentWorker>) {
        *self.worker.lock() = Some(worker);
    }

    #[must_use]
    pub fn worker(&self) -> Option<Arc<dyn SegmentWorker>> {
        self.worker.lock().clone()
    }

    /// Segment index the encoder is currently producing, when known.
    #[must_use]
    pub fn current_segment_index(&self) -> Option<u64> {
        self.worker
            .lock()
            .as_ref()
            .and_then(|worker| worker.current_segment_index())
    }

    pub async fn stop_worker(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.stop().await;
        }
        let mut state = self.state.lock();
        if !state.is_evictable() {
            *state = TranscodeJobState::Finished;
        }
    }

    /// Durable snapshot for the job record table.
    #[must_use]
    pub fn to_record(&self) -> TranscodeJobRecord {
        TranscodeJobRecord {
            id: self.id.clone(),
            session_id: self.session_id.clone(),
            part_id: self.part_id.clone(),
            variant_key: self.variant_key.clone(),
            protocol: self.protocol,
            state: self.state(),
            output_dir: self.output_dir.to_string_lossy().into_owned(),
            last_ping_at: Utc::now(),
            error: self.error(),
            current_segment: self.current_segment_index().map(|i| i as i64),
            created_at: self.created_at,
        }
    }
}
