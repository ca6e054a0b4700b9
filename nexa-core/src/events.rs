//! Playback event publishing.
//!
//! The core publishes lifecycle and progress events; real-time delivery
//! (websocket push, cache invalidation fan-out) is an external collaborator
//! behind the `EventPublisher` trait.

use serde::{Deserialize, Serialize};

use crate::models::{ItemId, JobId, PlaybackState, SessionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PlaybackEvent {
    SessionStarted {
        session_id: SessionId,
        item_id: ItemId,
    },
    Progress {
        session_id: SessionId,
        item_id: Option<ItemId>,
        playhead_ms: u64,
        state: PlaybackState,
    },
    ItemChanged {
        session_id: SessionId,
        item_id: ItemId,
        playlist_index: i64,
    },
    SessionStopped {
        session_id: SessionId,
    },
    JobFailed {
        session_id: SessionId,
        job_id: JobId,
        error: String,
    },
}

/// Sink for playback events. Implementations must not block the caller.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: PlaybackEvent);
}

/// Publisher that only logs. Default when no delivery mechanism is wired.
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn publish(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback event");
    }
}
