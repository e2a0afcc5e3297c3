//! Session State Machine — facilitator-driven lifecycle transitions.
//!
//! Draft → InProgress → Completed → Closed, linear, no skipping, no reverse.
//! Re-invoking a transition whose target state already holds is an idempotent
//! no-op success (retries from flaky connections must not fail) and emits no
//! duplicate event. Events publish under the session lock so subscribers see
//! them in commit order.

use chrono::Utc;
use percolate_core::error::SessionError;
use percolate_core::models::{Session, SessionEvent, SessionStatus};
use uuid::Uuid;

use super::hub::BroadcastHub;
use super::store::SessionStore;

/// Result of a lifecycle call: the updated snapshot plus the point-in-time
/// counts used by the export collaborator.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub session: Session,
    pub participant_count: usize,
    pub note_count: usize,
    /// False when the call collapsed into an idempotent no-op.
    pub changed: bool,
}

/// Draft → InProgress. Facilitator-only.
pub async fn start_session(
    store: &SessionStore,
    hub: &BroadcastHub,
    session_id: Uuid,
    actor_id: &str,
) -> Result<TransitionOutcome, SessionError> {
    transition(store, hub, session_id, actor_id, SessionStatus::InProgress).await
}

/// InProgress → Completed. Facilitator-only. The emitted `StatusChanged`
/// carries the participant/note counts snapshotted at completion.
pub async fn complete_session(
    store: &SessionStore,
    hub: &BroadcastHub,
    session_id: Uuid,
    actor_id: &str,
) -> Result<TransitionOutcome, SessionError> {
    transition(store, hub, session_id, actor_id, SessionStatus::Completed).await
}

/// Completed → Closed. Facilitator-only. The session is read-only afterwards;
/// also emits `SessionEnded` for the notification collaborator.
pub async fn close_session(
    store: &SessionStore,
    hub: &BroadcastHub,
    session_id: Uuid,
    actor_id: &str,
) -> Result<TransitionOutcome, SessionError> {
    transition(store, hub, session_id, actor_id, SessionStatus::Closed).await
}

async fn transition(
    store: &SessionStore,
    hub: &BroadcastHub,
    session_id: Uuid,
    actor_id: &str,
    target: SessionStatus,
) -> Result<TransitionOutcome, SessionError> {
    let mut record = store.lock_session(session_id).await?;

    if record.session.facilitator_id != actor_id {
        return Err(SessionError::Forbidden(format!(
            "only the facilitator may move the session to {}",
            target
        )));
    }

    // Idempotent retry: already in the target state, succeed without an event.
    if record.session.status == target {
        return Ok(TransitionOutcome {
            session: record.session.clone(),
            participant_count: record.participants.len(),
            note_count: record.notes.len(),
            changed: false,
        });
    }

    if record.session.status.is_terminal() {
        return Err(SessionError::SessionClosed);
    }

    if !record.session.status.can_transition_to(target) {
        return Err(SessionError::InvalidTransition {
            from: record.session.status,
            to: target,
        });
    }

    let now = Utc::now();
    match target {
        SessionStatus::InProgress => record.session.started_at = Some(now),
        SessionStatus::Completed => record.session.completed_at = Some(now),
        SessionStatus::Closed => record.session.closed_at = Some(now),
        SessionStatus::Draft => unreachable!("no transition targets Draft"),
    }
    record.session.status = target;

    let outcome = TransitionOutcome {
        session: record.session.clone(),
        participant_count: record.participants.len(),
        note_count: record.notes.len(),
        changed: true,
    };

    tracing::info!(
        "Session {} -> {} by {} ({} participants, {} notes)",
        session_id,
        target,
        actor_id,
        outcome.participant_count,
        outcome.note_count
    );

    hub.publish(&SessionEvent::StatusChanged {
        session_id,
        status: target,
        participant_count: outcome.participant_count,
        note_count: outcome.note_count,
    });
    if target == SessionStatus::Closed {
        hub.publish(&SessionEvent::SessionEnded {
            session_id,
            title: outcome.session.title.clone(),
        });
    }

    Ok(outcome)
}
