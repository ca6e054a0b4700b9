//! Per-session mutual exclusion.
//!
//! Every session-scoped mutation runs under that session's lock; there is
//! no global lock. Entries are created on demand and dropped with the
//! session.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::SessionId;

#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<DashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for one session, created on first use.
    #[must_use]
    pub fn for_session(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop a session's lock entry (after the session is deleted).
    pub fn remove(&self, session_id: &SessionId) {
        self.locks.remove(session_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_session_serializes() {
        let locks = SessionLocks::new();
        let id = SessionId::new();

        let lock = locks.for_session(&id);
        let guard = lock.lock().await;

        let second = locks.for_session(&id);
        assert!(second.try_lock().is_err());
        drop(guard);
        assert!(second.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_different_sessions_are_independent() {
        let locks = SessionLocks::new();
        let a = locks.for_session(&SessionId::new());
        let b = locks.for_session(&SessionId::new());
        let _ga = a.lock().await;
        assert!(b.try_lock().is_ok());
    }

    #[test]
    fn test_remove_clears_entry() {
        let locks = SessionLocks::new();
        let id = SessionId::new();
        let _ = locks.for_session(&id);
        assert_eq!(locks.len(), 1);
        locks.remove(&id);
        assert!(locks.is_empty());
    }
}
