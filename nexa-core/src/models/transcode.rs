//! Persisted transcode job records.
//!
//! The live worker state lives in `nexa-transcode`; this record is the
//! durable view used for correlation and post-mortem inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{JobId, MediaPartId, SessionId};
use super::plan::StreamProtocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeJobState {
    Starting,
    Running,
    Paused,
    Finished,
    Failed,
}

impl TranscodeJobState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    /// Failed/Finished directories are reclaimable by the LRU.
    #[must_use]
    pub const fn is_evictable(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl std::str::FromStr for TranscodeJobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown transcode job state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJobRecord {
    pub id: JobId,
    pub session_id: SessionId,
    pub part_id: MediaPartId,
    pub variant_key: String,
    pub protocol: StreamProtocol,
    pub state: TranscodeJobState,
    /// Exclusively owned by the job for its lifetime.
    pub output_dir: String,
    pub last_ping_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Segment index the encoder is currently producing, when known.
    pub current_segment: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evictable_states() {
        assert!(!TranscodeJobState::Starting.is_evictable());
        assert!(!TranscodeJobState::Running.is_evictable());
        assert!(!TranscodeJobState::Paused.is_evictable());
        assert!(TranscodeJobState::Finished.is_evictable());
        assert!(TranscodeJobState::Failed.is_evictable());
    }

    #[test]
    fn test_state_roundtrip() {
        for state in [
            TranscodeJobState::Starting,
            TranscodeJobState::Running,
            TranscodeJobState::Paused,
            TranscodeJobState::Finished,
            TranscodeJobState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<TranscodeJobState>(), Ok(state));
        }
    }
}
