//! Capability store: versioned, per-session capability declarations.
//!
//! Declarations append to a version chain; duplicate bodies never bump the
//! version. Upserts reach this service only from operations holding the
//! per-session lock, which keeps version numbers gapless and monotonic;
//! the unique `(session_id, version)` constraint backstops that.

use chrono::Utc;

use crate::models::{CapabilityProfile, ClientCapabilities, SessionId};
use crate::repository::CapabilityRepository;
use crate::Result;

/// Result of an upsert: the now-effective version and whether the client's
/// claimed version disagrees with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub effective_version: i32,
    pub mismatch: bool,
    /// Whether this call appended a new version.
    pub created: bool,
}

/// The capability the planner should plan against.
#[derive(Debug, Clone)]
pub struct EffectiveCapability {
    /// 0 when nothing was ever declared (synthesized fallback).
    pub version: i32,
    pub capabilities: ClientCapabilities,
}

#[derive(Clone)]
pub struct CapabilityService {
    repo: CapabilityRepository,
}

impl CapabilityService {
    #[must_use]
    pub const fn new(repo: CapabilityRepository) -> Self {
        Self { repo }
    }

    /// Record a declaration. Appends a new version only when the body
    /// differs from the head; otherwise the head stays effective.
    /// Callers serialize per session (the session lock).
    pub async fn upsert(
        &self,
        session_id: &SessionId,
        declaration: ClientCapabilities,
        device_id: Option<String>,
        device_name: Option<String>,
        declared_version: Option<i32>,
    ) -> Result<UpsertOutcome> {
        let head = self.repo.head(session_id).await?;
        let (effective_version, created) = match &head {
            Some(head) if head.capabilities == declaration => (head.version, false),
            Some(head) => (head.version + 1, true),
            None => (1, true),
        };

        if created {
            let profile = CapabilityProfile {
                session_id: session_id.clone(),
                version: effective_version,
                device_id,
                device_name,
                capabilities: declaration,
                declared_at: Utc::now(),
            };
            self.repo.insert(&profile).await?;
            tracing::debug!(
                session_id = %session_id,
                version = effective_version,
                "capability version appended"
            );
        }

        Ok(UpsertOutcome {
            effective_version,
            mismatch: version_mismatch(declared_version, effective_version),
            created,
        })
    }

    /// Head profile, or the synthesized fallback when nothing was declared.
    pub async fn effective(&self, session_id: &SessionId) -> Result<EffectiveCapability> {
        match self.repo.head(session_id).await? {
            Some(head) => Ok(EffectiveCapability {
                version: head.version,
                capabilities: head.capabilities,
            }),
            None => Ok(EffectiveCapability {
                version: 0,
                capabilities: ClientCapabilities::fallback(),
            }),
        }
    }

    /// Check a client's claimed version against the stored head without
    /// declaring anything.
    pub async fn check_version(
        &self,
        session_id: &SessionId,
        declared_version: Option<i32>,
    ) -> Result<UpsertOutcome> {
        let effective = self.effective(session_id).await?;
        Ok(UpsertOutcome {
            effective_version: effective.version,
            mismatch: version_mismatch(declared_version, effective.version),
            created: false,
        })
    }

    /// Drop a session's version chain (session teardown).
    pub async fn delete_for_session(&self, session_id: &SessionId) -> Result<()> {
        self.repo.delete_for_session(session_id).await?;
        Ok(())
    }
}

/// A mismatch exists only when the client claimed a version and it is not
/// the effective one.
#[must_use]
pub fn version_mismatch(declared: Option<i32>, effective: i32) -> bool {
    declared.is_some_and(|v| v != effective)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_rules() {
        assert!(!version_mismatch(None, 3));
        assert!(!version_mismatch(Some(3), 3));
        assert!(version_mismatch(Some(2), 3));
        assert!(version_mismatch(Some(4), 3));
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_duplicate_body_keeps_version() {
        // Integration test placeholder
    }

    #[tokio::test]
    #[ignore = "Requires database"]
    async fn test_versions_are_gapless_under_concurrency() {
        // Integration test placeholder
    }
}
