//! Export — read-only snapshot for the external report generator.

use chrono::{DateTime, Utc};
use percolate_core::error::SessionError;
use percolate_core::models::{Note, Participant, Session, SessionStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::SessionStore;

/// Everything the export collaborator needs: the session, all participants,
/// and all notes in sequence order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub session: Session,
    pub participants: Vec<Participant>,
    pub notes: Vec<Note>,
    pub exported_at: DateTime<Utc>,
}

/// Build the snapshot. Only meaningful once discussion has ended, so sessions
/// still in Draft or InProgress are a lifecycle violation.
pub async fn session_snapshot(
    store: &SessionStore,
    session_id: Uuid,
) -> Result<SessionExport, SessionError> {
    let record = store.lock_session(session_id).await?;
    match record.session.status {
        SessionStatus::Completed | SessionStatus::Closed => Ok(SessionExport {
            session: record.session.clone(),
            participants: record.participants.clone(),
            notes: record.notes.clone(),
            exported_at: Utc::now(),
        }),
        from => Err(SessionError::InvalidTransition {
            from,
            to: SessionStatus::Completed,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::{hub::BroadcastHub, ledger, lifecycle};
    use percolate_core::config::GatewayConfig;
    use percolate_core::models::NoteType;

    #[tokio::test]
    async fn test_export_requires_completed_or_closed() {
        let store = SessionStore::new(&GatewayConfig::default());
        let hub = BroadcastHub::new();
        let session = store.create_session("retro", "fac-1", None).unwrap();

        let err = session_snapshot(&store, session.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");

        lifecycle::start_session(&store, &hub, session.id, "fac-1")
            .await
            .unwrap();
        let err = session_snapshot(&store, session.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_export_carries_notes_in_sequence_order() {
        let store = SessionStore::new(&GatewayConfig::default());
        let hub = BroadcastHub::new();
        let session = store.create_session("retro", "fac-1", None).unwrap();
        {
            let mut record = store.lock_session(session.id).await.unwrap();
            record.participant_mut("fac-1").unwrap().is_active = true;
        }
        lifecycle::start_session(&store, &hub, session.id, "fac-1")
            .await
            .unwrap();
        for body in ["first", "second"] {
            ledger::append_note(&store, &hub, session.id, "fac-1", body, NoteType::General)
                .await
                .unwrap();
        }
        lifecycle::complete_session(&store, &hub, session.id, "fac-1")
            .await
            .unwrap();

        let export = session_snapshot(&store, session.id).await.unwrap();
        assert_eq!(export.session.status, SessionStatus::Completed);
        assert_eq!(export.participants.len(), 1);
        let sequences: Vec<u64> = export.notes.iter().map(|n| n.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }
}
