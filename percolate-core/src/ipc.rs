//! Wire protocol for the session gateway.
//!
//! Requests arrive either over the Unix-socket realtime channel (4-byte
//! little-endian length prefix + MessagePack payload) or as HTTP bodies; both
//! surfaces dispatch the same `GatewayRequest` and answer with the same
//! `AppResult` envelope the frontend depends on. Actor identity (`actor_id`)
//! is supplied by the external identity collaborator and trusted as-is.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::SessionEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GatewayRequest {
    Ping,
    Health,
    CreateSession {
        actor_id: String,
        title: String,
        #[serde(default)]
        display_name: Option<String>,
    },
    GetSession {
        session_id: Uuid,
    },
    ListSessions {
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        page_size: Option<u32>,
    },
    StartSession {
        actor_id: String,
        session_id: Uuid,
    },
    CompleteSession {
        actor_id: String,
        session_id: Uuid,
    },
    CloseSession {
        actor_id: String,
        session_id: Uuid,
    },
    /// Marks the actor present and, on the realtime channel, subscribes the
    /// connection to the session's event stream.
    Join {
        actor_id: String,
        session_id: Uuid,
        #[serde(default)]
        display_name: Option<String>,
    },
    Leave {
        actor_id: String,
        session_id: Uuid,
    },
    AppendNote {
        actor_id: String,
        session_id: Uuid,
        body: String,
        /// Wire string, validated against the closed classification set.
        note_type: String,
    },
    ListNotes {
        session_id: Uuid,
        #[serde(default)]
        after_sequence: Option<u64>,
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        page_size: Option<u32>,
    },
    ListParticipants {
        session_id: Uuid,
    },
    ActiveParticipants {
        session_id: Uuid,
    },
    ExportSession {
        session_id: Uuid,
    },
    Subscribe {
        session_id: Uuid,
    },
    Unsubscribe {
        session_id: Uuid,
    },
}

/// One field-level validation failure inside the envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub property_name: String,
    pub error_message: String,
}

/// The result envelope every gateway operation returns. This shape is the one
/// structural contract the frontend depends on and is reproduced exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<ValidationError>>,
}

impl<T> AppResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error_code: None,
            validation_errors: None,
        }
    }

    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error_code: Some(code.into()),
            validation_errors: None,
        }
    }

    pub fn invalid(
        message: impl Into<String>,
        errors: Vec<ValidationError>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            error_code: Some("INVALID_ARGUMENT".to_string()),
            validation_errors: Some(errors),
        }
    }
}

/// Pagination wrapper carried in `data` by list operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResults<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub total_pages: u32,
    pub current_page: u32,
    pub page_size: u32,
}

impl<T> PagedResults<T> {
    /// Slice `items` (already filtered and ordered) into one page.
    pub fn paginate(items: Vec<T>, page: u32, page_size: u32) -> Self {
        let page = page.max(1);
        let page_size = page_size.max(1);
        let total_count = items.len() as u64;
        let total_pages = ((total_count + page_size as u64 - 1) / page_size as u64) as u32;
        let start = ((page - 1) as usize).saturating_mul(page_size as usize);
        let page_items: Vec<T> = items
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        Self {
            items: page_items,
            total_count,
            total_pages,
            current_page: page,
            page_size,
        }
    }
}

/// Frames pushed to a realtime connection: replies to its own requests,
/// interleaved with subscribed session events. Both ride the same
/// per-connection channel so ordering is stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    Reply {
        result: AppResult<serde_json::Value>,
    },
    Event {
        event: SessionEvent,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_ok_shape() {
        let r = AppResult::ok(serde_json::json!({"id": 1}));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["success"], true);
        assert_eq!(v["data"]["id"], 1);
        assert!(v.get("errorCode").is_none());
        assert!(v.get("validationErrors").is_none());
    }

    #[test]
    fn test_envelope_err_shape_uses_camel_case_keys() {
        let r: AppResult<serde_json::Value> = AppResult::err("FORBIDDEN", "not the facilitator");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["errorCode"], "FORBIDDEN");
        assert_eq!(v["message"], "not the facilitator");
    }

    #[test]
    fn test_envelope_validation_errors_shape() {
        let r: AppResult<serde_json::Value> = AppResult::invalid(
            "validation failed",
            vec![ValidationError {
                property_name: "body".into(),
                error_message: "must not be empty".into(),
            }],
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["errorCode"], "INVALID_ARGUMENT");
        assert_eq!(v["validationErrors"][0]["propertyName"], "body");
        assert_eq!(v["validationErrors"][0]["errorMessage"], "must not be empty");
    }

    #[test]
    fn test_paginate_splits_and_counts() {
        let items: Vec<u32> = (1..=7).collect();
        let page = PagedResults::paginate(items, 2, 3);
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total_count, 7);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.page_size, 3);
    }

    #[test]
    fn test_paginate_out_of_range_page_is_empty() {
        let page = PagedResults::paginate(vec![1, 2], 5, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total_count, 2);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_paginate_zero_page_clamps_to_first() {
        let page = PagedResults::paginate(vec![1, 2, 3], 0, 2);
        assert_eq!(page.items, vec![1, 2]);
        assert_eq!(page.current_page, 1);
    }

    #[test]
    fn test_request_round_trips_through_messagepack() {
        let req = GatewayRequest::AppendNote {
            actor_id: "u1".into(),
            session_id: Uuid::new_v4(),
            body: "standup blocker".into(),
            note_type: "ActionItem".into(),
        };
        let bytes = rmp_serde::to_vec_named(&req).unwrap();
        let back: GatewayRequest = rmp_serde::from_slice(&bytes).unwrap();
        match back {
            GatewayRequest::AppendNote { note_type, body, .. } => {
                assert_eq!(note_type, "ActionItem");
                assert_eq!(body, "standup blocker");
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_server_message_is_tagged_by_kind() {
        let msg = ServerMessage::Reply {
            result: AppResult::ok(serde_json::json!({})),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["kind"], "reply");
    }
}
