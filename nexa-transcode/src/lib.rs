//! Segmented transcode management for the Nexa playback core.
//!
//! Owns the live encoder workers, the LRU job cache, the smart-segment
//! serving policy, and the subtitle/trickplay sidecar generators. The
//! orchestrator in `nexa-core` talks to this crate only through URLs and
//! the `JobStopper` stop hook; clients talk to it through the DASH and
//! subtitle endpoints in `nexa-api`.

pub mod job;
pub mod manager;
pub mod segment;
pub mod subtitle;
pub mod trickplay;
pub mod variant;
pub mod worker;

pub use job::TranscodeJob;
pub use manager::{JobKey, ManifestResponse, SegmentResponse, TranscodeManager};
pub use segment::{content_type_for, is_init_segment, parse_segment_index, validate_segment_name};
pub use subtitle::SubtitleService;
pub use trickplay::build_trickplay_vtt;
pub use variant::variant_key;
pub use worker::{FfmpegWorkerFactory, SegmentWorker, WorkerFactory, WorkerSpec};
