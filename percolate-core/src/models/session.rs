use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a Lean Coffee session.
///
/// Transitions are linear and monotonic: Draft → InProgress → Completed →
/// Closed. No skipping, no reverse transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Draft,
    InProgress,
    Completed,
    Closed,
}

impl SessionStatus {
    /// Whether `self → to` is a valid single-step transition.
    pub fn can_transition_to(self, to: SessionStatus) -> bool {
        matches!(
            (self, to),
            (SessionStatus::Draft, SessionStatus::InProgress)
                | (SessionStatus::InProgress, SessionStatus::Completed)
                | (SessionStatus::Completed, SessionStatus::Closed)
        )
    }

    /// Closed sessions are read-only; every mutation fails with `SessionClosed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Closed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Draft => "Draft",
            SessionStatus::InProgress => "InProgress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Closed => "Closed",
        };
        f.write_str(s)
    }
}

/// Wire snapshot of one session. Participant and note collections live in the
/// store record and travel separately; the snapshot stays cheap to fan out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub title: String,
    pub status: SessionStatus,
    pub facilitator_id: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(title: impl Into<String>, facilitator_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            status: SessionStatus::Draft,
            facilitator_id: facilitator_id.into(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            closed_at: None,
        }
    }
}
