use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantRole {
    Facilitator,
    Attendee,
}

/// A participant of one session. Created on first join and never deleted —
/// only deactivated — so note authorship always resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    pub role: ParticipantRole,
    /// Current connectivity, derived from presence signals. Independent of role.
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        role: ParticipantRole,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role,
            is_active: true,
            joined_at: Utc::now(),
            left_at: None,
        }
    }
}
