//! Note Ledger — append-only, ordered notes per session.
//!
//! Sequence numbers come from the session record's counter and are assigned
//! under the per-session lock, so they are strictly increasing and gap-free
//! for committed notes even with concurrent appenders, independent of clock
//! skew. Notes are immutable once created; there is no update or delete.

use chrono::Utc;
use percolate_core::error::SessionError;
use percolate_core::models::{Note, NoteType, SessionEvent};
use uuid::Uuid;

use super::hub::BroadcastHub;
use super::store::SessionStore;

/// Append an immutable note. Fails with `SessionClosed` on a terminal
/// session and `Forbidden` unless the author is an active participant.
pub async fn append_note(
    store: &SessionStore,
    hub: &BroadcastHub,
    session_id: Uuid,
    author_id: &str,
    body: &str,
    note_type: NoteType,
) -> Result<Note, SessionError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(SessionError::InvalidArgument(
            "body must not be empty".to_string(),
        ));
    }

    let mut record = store.lock_session(session_id).await?;

    if record.session.status.is_terminal() {
        return Err(SessionError::SessionClosed);
    }

    let active = record
        .participant(author_id)
        .map(|p| p.is_active)
        .unwrap_or(false);
    if !active {
        return Err(SessionError::Forbidden(format!(
            "{} is not an active participant of session {}",
            author_id, session_id
        )));
    }

    let sequence = record.next_sequence;
    record.next_sequence += 1;

    let note = Note {
        id: Uuid::new_v4(),
        session_id,
        author_id: author_id.to_string(),
        body: body.to_string(),
        note_type,
        sequence,
        created_at: Utc::now(),
    };
    record.notes.push(note.clone());

    tracing::debug!(
        "Note {} appended to session {} by {} (seq {}, {})",
        note.id,
        session_id,
        author_id,
        sequence,
        note_type
    );

    hub.publish(&SessionEvent::NoteAdded {
        session_id,
        note: note.clone(),
    });

    Ok(note)
}

/// Notes of a session in ascending sequence order, optionally resuming after
/// a cursor. Restartable: reconnecting clients pass their last-seen sequence
/// to catch up on exactly the notes they missed.
pub async fn list_notes(
    store: &SessionStore,
    session_id: Uuid,
    after_sequence: Option<u64>,
) -> Result<Vec<Note>, SessionError> {
    let record = store.lock_session(session_id).await?;
    let cursor = after_sequence.unwrap_or(0);
    let notes: Vec<Note> = record
        .notes
        .iter()
        .filter(|n| n.sequence > cursor)
        .cloned()
        .collect();
    // The ledger is append-only under the lock, so it is already ordered.
    debug_assert!(notes.windows(2).all(|w| w[0].sequence < w[1].sequence));
    Ok(notes)
}
