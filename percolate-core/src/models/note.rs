use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Closed classification set. Callers supply the type as a wire string; the
/// gateway validates against this enum so an unknown value is an
/// `InvalidArgument`, never a silent passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteType {
    General,
    Decision,
    ActionItem,
    KeyPoint,
}

impl NoteType {
    /// Parse a caller-supplied classification. Returns `None` for anything
    /// outside the fixed enumeration.
    pub fn parse(s: &str) -> Option<NoteType> {
        match s {
            "General" => Some(NoteType::General),
            "Decision" => Some(NoteType::Decision),
            "ActionItem" => Some(NoteType::ActionItem),
            "KeyPoint" => Some(NoteType::KeyPoint),
            _ => None,
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoteType::General => "General",
            NoteType::Decision => "Decision",
            NoteType::ActionItem => "ActionItem",
            NoteType::KeyPoint => "KeyPoint",
        };
        f.write_str(s)
    }
}

/// An immutable, classified contribution. Never edited or deleted once
/// appended; `sequence` is the per-session ordering key, assigned under the
/// session lock so it is strictly increasing and gap-free regardless of
/// clock skew.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub session_id: Uuid,
    pub author_id: String,
    pub body: String,
    pub note_type: NoteType,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}
