use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::note::Note;
use super::participant::Participant;
use super::session::SessionStatus;

/// Transient state-change event fanned out by the broadcast hub. Not
/// persisted beyond delivery; a client that misses one catches up through
/// the note ledger's sequence cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// First-ever join of a user to a session.
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        session_id: Uuid,
        participant: Participant,
    },
    /// Emitted after the disconnect grace period expires without a reconnect.
    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        session_id: Uuid,
        participant: Participant,
    },
    /// Lighter signal for a known participant flipping active/inactive.
    #[serde(rename_all = "camelCase")]
    PresenceChanged {
        session_id: Uuid,
        user_id: String,
        active: bool,
    },
    /// Lifecycle transition, carrying the point-in-time counts used by the
    /// export snapshot.
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        session_id: Uuid,
        status: SessionStatus,
        participant_count: usize,
        note_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    NoteAdded { session_id: Uuid, note: Note },
    /// The session was archived; surfaced to the push-notification collaborator.
    #[serde(rename_all = "camelCase")]
    SessionEnded { session_id: Uuid, title: String },
}

impl SessionEvent {
    /// The session this event belongs to; the hub fans out per session.
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::ParticipantJoined { session_id, .. }
            | SessionEvent::ParticipantLeft { session_id, .. }
            | SessionEvent::PresenceChanged { session_id, .. }
            | SessionEvent::StatusChanged { session_id, .. }
            | SessionEvent::NoteAdded { session_id, .. }
            | SessionEvent::SessionEnded { session_id, .. } => *session_id,
        }
    }
}
