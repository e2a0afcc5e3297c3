//! Session Store — single source of truth for sessions, participants, and notes.
//!
//! Every session lives behind its own `tokio::sync::Mutex`, which is the one
//! per-session serialization point: state transitions, note appends, and
//! presence upserts all go through `lock_session`. Different sessions proceed
//! fully in parallel; there is no global write lock. Lock acquisition is
//! bounded — callers that cannot get the lock within the configured timeout
//! get `Busy` instead of queueing indefinitely.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use percolate_core::config::GatewayConfig;
use percolate_core::error::SessionError;
use percolate_core::models::{Note, Participant, ParticipantRole, Session};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// The owned state of one session. Only reachable through `lock_session`.
#[derive(Debug)]
pub struct SessionRecord {
    pub session: Session,
    /// Ordered by first join.
    pub participants: Vec<Participant>,
    /// Append-only, ordered by `sequence`.
    pub notes: Vec<Note>,
    /// Next note sequence number; starts at 1, gap-free for committed notes.
    pub next_sequence: u64,
}

impl SessionRecord {
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionRecord>>>>,
    lock_timeout: Duration,
}

impl SessionStore {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }

    /// Create a Draft session. The facilitator is pre-registered as its sole
    /// Facilitator participant (inactive until they connect) so the
    /// facilitator reference always resolves.
    pub fn create_session(
        &self,
        title: &str,
        facilitator_id: &str,
        facilitator_name: Option<&str>,
    ) -> Result<Session, SessionError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SessionError::InvalidArgument(
                "title must not be empty".to_string(),
            ));
        }
        if facilitator_id.trim().is_empty() {
            return Err(SessionError::InvalidArgument(
                "facilitator id must not be empty".to_string(),
            ));
        }

        let session = Session::new(title, facilitator_id);
        let mut facilitator = Participant::new(
            facilitator_id,
            facilitator_name.unwrap_or(facilitator_id),
            ParticipantRole::Facilitator,
        );
        facilitator.is_active = false;

        let record = SessionRecord {
            session: session.clone(),
            participants: vec![facilitator],
            notes: Vec::new(),
            next_sequence: 1,
        };

        let mut sessions = self.sessions.write().expect("session registry poisoned");
        sessions.insert(session.id, Arc::new(Mutex::new(record)));
        tracing::info!("Session {} created by {}", session.id, facilitator_id);
        Ok(session)
    }

    /// Acquire the per-session lock within the configured timeout.
    /// `NotFound` for unknown sessions, `Busy` when the timeout elapses.
    pub async fn lock_session(
        &self,
        id: Uuid,
    ) -> Result<OwnedMutexGuard<SessionRecord>, SessionError> {
        let entry = {
            let sessions = self.sessions.read().expect("session registry poisoned");
            sessions
                .get(&id)
                .cloned()
                .ok_or_else(|| SessionError::NotFound(format!("session {}", id)))?
        };

        match tokio::time::timeout(self.lock_timeout, entry.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => Err(SessionError::Busy),
        }
    }

    /// Snapshot of every session, newest first. Each per-session lock is
    /// taken briefly under the same bounded timeout as `lock_session`.
    pub async fn list_sessions(&self) -> Result<Vec<Session>, SessionError> {
        let entries: Vec<Arc<Mutex<SessionRecord>>> = {
            let sessions = self.sessions.read().expect("session registry poisoned");
            sessions.values().cloned().collect()
        };

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let record = tokio::time::timeout(self.lock_timeout, entry.lock())
                .await
                .map_err(|_| SessionError::Busy)?;
            out.push(record.session.clone());
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().expect("session registry poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use percolate_core::models::SessionStatus;

    fn store() -> SessionStore {
        SessionStore::new(&GatewayConfig::default())
    }

    #[tokio::test]
    async fn test_create_session_registers_facilitator() {
        let store = store();
        let session = store.create_session("retro", "fac-1", Some("Faye")).unwrap();
        assert_eq!(session.status, SessionStatus::Draft);

        let record = store.lock_session(session.id).await.unwrap();
        let p = record.participant("fac-1").expect("facilitator registered");
        assert_eq!(p.role, ParticipantRole::Facilitator);
        assert_eq!(p.display_name, "Faye");
        assert!(!p.is_active, "facilitator not connected yet");
        assert_eq!(record.next_sequence, 1);
    }

    #[tokio::test]
    async fn test_create_session_rejects_empty_title() {
        let store = store();
        let err = store.create_session("   ", "fac-1", None).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_lock_unknown_session_is_not_found() {
        let store = store();
        let err = store.lock_session(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_lock_timeout_yields_busy() {
        let config = GatewayConfig {
            lock_timeout_ms: 20,
            ..GatewayConfig::default()
        };
        let store = SessionStore::new(&config);
        let session = store.create_session("retro", "fac-1", None).unwrap();

        let _held = store.lock_session(session.id).await.unwrap();
        let err = store.lock_session(session.id).await.unwrap_err();
        assert_eq!(err, SessionError::Busy);
    }

    #[tokio::test]
    async fn test_different_sessions_do_not_contend() {
        let store = store();
        let a = store.create_session("a", "fac-1", None).unwrap();
        let b = store.create_session("b", "fac-1", None).unwrap();

        let _guard_a = store.lock_session(a.id).await.unwrap();
        // Holding a's lock must not block b.
        let guard_b = store.lock_session(b.id).await.unwrap();
        assert_eq!(guard_b.session.id, b.id);
    }

    #[tokio::test]
    async fn test_list_sessions_respects_lock_timeout() {
        let config = GatewayConfig {
            lock_timeout_ms: 20,
            ..GatewayConfig::default()
        };
        let store = SessionStore::new(&config);
        let session = store.create_session("retro", "fac-1", None).unwrap();

        let _held = store.lock_session(session.id).await.unwrap();
        let err = store.list_sessions().await.unwrap_err();
        assert_eq!(err, SessionError::Busy);
    }

    #[tokio::test]
    async fn test_list_sessions_newest_first() {
        let store = store();
        let first = store.create_session("first", "fac-1", None).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = store.create_session("second", "fac-1", None).unwrap();

        let listed = store.list_sessions().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }
}
