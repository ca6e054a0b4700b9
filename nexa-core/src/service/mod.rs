pub mod capability;
pub mod gop;
pub mod locks;
pub mod planner;
pub mod playlist;
pub mod session;

pub use capability::{CapabilityService, EffectiveCapability, UpsertOutcome};
pub use gop::{GopIndexService, KeyframeLookup};
pub use locks::SessionLocks;
pub use planner::{plan, TranscodePolicy};
pub use playlist::{ChunkItem, ChunkPayload, NavigatePayload, PlaylistService};
pub use session::{
    DecideAction, DecidePayload, DecideStatus, HeartbeatPayload, JobStopper, NoopJobStopper,
    PlaybackResumePayload, PlaybackService, PlaybackStartPayload, SeekPayload, StartRequest,
};
