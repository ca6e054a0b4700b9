pub mod capability;
pub mod id;
pub mod media;
pub mod plan;
pub mod playlist;
pub mod session;
pub mod transcode;

pub use capability::{
    CapabilityProfile, ClientCapabilities, CodecProfile, ConditionOperator, ContainerProfile,
    DirectPlayProfile, MediaKind, ProfileCondition, ResponseProfile, SubtitleDeliveryMethod,
    SubtitleProfile, TranscodingProfile,
};
pub use id::{generate_id, GeneratorId, ItemId, JobId, MediaPartId, SessionId};
pub use media::{
    MediaPart, MediaSourceFacts, MediaStream, StreamKind, TrickplayFacts,
};
pub use plan::{PlayMethod, StreamPlan, StreamProtocol, SubtitlePlan, TranscodeReasons};
pub use playlist::{
    PlaylistCursor, PlaylistGenerator, PlaylistItem, SeedDescriptor, SeedKind, ShuffleState,
    StepOutcome,
};
pub use session::{PlaybackSession, PlaybackState};
pub use transcode::{TranscodeJobRecord, TranscodeJobState};
