//! Playback session records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::id::{GeneratorId, ItemId, MediaPartId, SessionId};

/// Client-reported playback state. Transitions form a DAG ending at `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Buffering,
    Ended,
}

impl PlaybackState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Buffering => "buffering",
            Self::Ended => "ended",
        }
    }

    /// `Ended` is terminal; everything else may move anywhere.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        !matches!(self, Self::Ended) || matches!(next, Self::Ended)
    }
}

impl std::str::FromStr for PlaybackState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "playing" => Ok(Self::Playing),
            "paused" => Ok(Self::Paused),
            "buffering" => Ok(Self::Buffering),
            "ended" => Ok(Self::Ended),
            other => Err(format!("unknown playback state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSession {
    pub id: SessionId,
    /// Opaque identity of the owning user/device.
    pub user_id: String,
    pub device_id: Option<String>,
    pub current_item_id: Option<ItemId>,
    /// Null until the first segment (or direct byte) is served.
    pub current_part_id: Option<MediaPartId>,
    pub generator_id: Option<GeneratorId>,
    /// Head capability version, 0 when nothing was ever declared.
    pub capability_version: i32,
    pub playhead_ms: u64,
    pub state: PlaybackState,
    pub originator: Option<String>,
    pub context: Option<serde_json::Value>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PlaybackSession {
    #[must_use]
    pub fn new(user_id: String, inactivity_window: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id,
            device_id: None,
            current_item_id: None,
            current_part_id: None,
            generator_id: None,
            capability_version: 0,
            playhead_ms: 0,
            state: PlaybackState::Playing,
            originator: None,
            context: None,
            last_heartbeat_at: now,
            expires_at: now + inactivity_window,
            created_at: now,
        }
    }

    /// Refresh heartbeat and expiry.
    pub fn touch(&mut self, inactivity_window: Duration) {
        let now = Utc::now();
        self.last_heartbeat_at = now;
        self.expires_at = now + inactivity_window;
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert!(PlaybackState::Playing.can_transition_to(PlaybackState::Paused));
        assert!(PlaybackState::Buffering.can_transition_to(PlaybackState::Playing));
        assert!(PlaybackState::Paused.can_transition_to(PlaybackState::Ended));
        assert!(!PlaybackState::Ended.can_transition_to(PlaybackState::Playing));
        assert!(PlaybackState::Ended.can_transition_to(PlaybackState::Ended));
    }

    #[test]
    fn test_touch_extends_expiry() {
        let window = Duration::days(30);
        let mut session = PlaybackSession::new("user-1".to_string(), window);
        let first_expiry = session.expires_at;
        session.touch(window);
        assert!(session.expires_at >= first_expiry);
        assert!(!session.is_expired(Utc::now()));
    }

    #[test]
    fn test_state_parse() {
        assert_eq!(
            "buffering".parse::<PlaybackState>(),
            Ok(PlaybackState::Buffering)
        );
        assert!("stopped".parse::<PlaybackState>().is_err());
    }
}
