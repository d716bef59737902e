//! Session state store
//!
//! The single authority over live session state. Every session is an
//! explicit handle in one map (no ambient globals) and carries its own
//! `tokio::sync::Mutex`, so mutations within a session are linearized while
//! unrelated sessions proceed in parallel. The map lock is a short
//! `std::sync::RwLock` that is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use storm_domain::{Session, SessionError, SessionId};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

struct SessionHandle {
    state: Mutex<Session>,
    cancel: CancellationToken,
}

/// Owner of all live sessions.
pub struct SessionStateStore {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
}

impl SessionStateStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a freshly created session and return its id.
    pub fn insert(&self, session: Session) -> SessionId {
        let id = session.id().clone();
        let handle = Arc::new(SessionHandle {
            state: Mutex::new(session),
            cancel: CancellationToken::new(),
        });
        self.sessions
            .write()
            .expect("session map lock poisoned")
            .insert(id.clone(), handle);
        id
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .contains_key(id)
    }

    fn handle(&self, id: &SessionId) -> Result<Arc<SessionHandle>, SessionError> {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(format!("session {id}")))
    }

    /// Run a mutation under the session's exclusive lock.
    ///
    /// Rejects writes to concluded sessions with `Conflict` and to
    /// quarantined sessions with `Internal`. The closure is synchronous on
    /// purpose: nothing may await while the session is locked.
    pub async fn apply<T>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let handle = self.handle(id)?;
        let mut session = handle.state.lock().await;
        if session.is_quarantined() {
            return Err(SessionError::Internal(format!(
                "session {id} is quarantined pending review"
            )));
        }
        if session.lifecycle().is_concluded() {
            return Err(SessionError::Conflict(format!("session {id} has concluded")));
        }
        f(&mut session)
    }

    /// Read from the session under its lock. Allowed in every lifecycle
    /// state, including concluded and quarantined.
    pub async fn read<T>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&Session) -> T,
    ) -> Result<T, SessionError> {
        let handle = self.handle(id)?;
        let session = handle.state.lock().await;
        Ok(f(&session))
    }

    /// Cancellation token tied to the session's lifetime. Cancelled at
    /// conclusion so in-flight gateway work is discarded, not committed.
    pub fn cancel_token(&self, id: &SessionId) -> Result<CancellationToken, SessionError> {
        Ok(self.handle(id)?.cancel.clone())
    }

    /// Drop a session from the store after it has been archived. Cancels
    /// any remaining background work.
    pub fn remove(&self, id: &SessionId) {
        let removed = self
            .sessions
            .write()
            .expect("session map lock poisoned")
            .remove(id);
        match removed {
            Some(handle) => handle.cancel.cancel(),
            None => warn!(session = %id, "remove of unknown session"),
        }
    }
}

impl Default for SessionStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storm_domain::{ParticipantId, QuorumPolicy};

    fn new_session(id: &str) -> Session {
        Session::new(
            SessionId::new(id),
            ParticipantId::new("org"),
            "title",
            None,
            QuorumPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_apply_mutates_under_lock() {
        let store = SessionStateStore::new();
        let id = store.insert(new_session("s-1"));

        let seq = store.apply(&id, |s| Ok(s.next_event_seq())).await.unwrap();
        assert_eq!(seq, 1);
        let last = store.read(&id, |s| s.last_event_seq()).await.unwrap();
        assert_eq!(last, 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let store = SessionStateStore::new();
        let err = store
            .apply(&SessionId::new("ghost"), |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concluded_session_rejects_writes() {
        let store = SessionStateStore::new();
        let id = store.insert(new_session("s-1"));
        store
            .apply(&id, |s| {
                s.conclude();
                Ok(())
            })
            .await
            .unwrap();

        let err = store.apply(&id, |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
        // reads still work
        assert!(store.read(&id, |s| s.lifecycle()).await.is_ok());
    }

    #[tokio::test]
    async fn test_quarantined_session_rejects_writes() {
        let store = SessionStateStore::new();
        let id = store.insert(new_session("s-1"));
        store
            .apply(&id, |s| {
                s.quarantine();
                Ok(())
            })
            .await
            .unwrap();

        let err = store.apply(&id, |_| Ok(())).await.unwrap_err();
        assert!(matches!(err, SessionError::Internal(_)));
    }

    #[tokio::test]
    async fn test_concurrent_applies_are_serialized() {
        let store = Arc::new(SessionStateStore::new());
        let id = store.insert(new_session("s-1"));

        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.apply(&id, |s| Ok(s.next_event_seq())).await.unwrap()
            }));
        }

        let mut seqs = Vec::new();
        for handle in handles {
            seqs.push(handle.await.unwrap());
        }
        seqs.sort_unstable();
        // every draw observed exactly once, no gaps
        assert_eq!(seqs, (1..=64).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_sessions_do_not_block_each_other() {
        let store = Arc::new(SessionStateStore::new());
        let a = store.insert(new_session("s-a"));
        let b = store.insert(new_session("s-b"));

        // hold a's lock while mutating b
        let handle_a = store.handle(&a).unwrap();
        let _guard = handle_a.state.lock().await;
        store.apply(&b, |s| Ok(s.next_event_seq())).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_cancels_token() {
        let store = SessionStateStore::new();
        let id = store.insert(new_session("s-1"));
        let token = store.cancel_token(&id).unwrap();
        assert!(!token.is_cancelled());

        store.remove(&id);
        assert!(token.is_cancelled());
        assert!(!store.contains(&id));
    }
}
