//! Session Gateway dispatch.
//!
//! Validates request shape, trusts the actor identity supplied by the
//! external identity collaborator, routes to the subsystems, and maps every
//! typed failure into the result envelope. Internal faults never escape to a
//! client as raw errors.

use std::sync::Arc;

use percolate_core::config::PercolateConfig;
use percolate_core::error::SessionError;
use percolate_core::ipc::{AppResult, GatewayRequest, PagedResults, ValidationError};
use percolate_core::models::NoteType;
use serde::Serialize;
use serde_json::{json, Value};

use crate::server::ConnHandle;
use crate::subsystems::hub::BroadcastHub;
use crate::subsystems::presence::PresenceTracker;
use crate::subsystems::store::SessionStore;
use crate::subsystems::{export, ledger, lifecycle};

/// Shared state wired once at startup and handed to both gateway surfaces.
pub struct GatewayContext {
    pub store: Arc<SessionStore>,
    pub presence: Arc<PresenceTracker>,
    pub hub: Arc<BroadcastHub>,
    pub config: PercolateConfig,
}

impl GatewayContext {
    pub fn new(config: PercolateConfig) -> Self {
        let store = Arc::new(SessionStore::new(&config.gateway));
        let hub = Arc::new(BroadcastHub::new());
        let presence = Arc::new(PresenceTracker::new(
            store.clone(),
            hub.clone(),
            config.presence.clone(),
        ));
        Self {
            store,
            presence,
            hub,
            config,
        }
    }
}

/// Handle one gateway request. `conn` is present on the realtime channel and
/// absent for HTTP; subscription management needs it.
pub async fn handle_request(
    request: GatewayRequest,
    ctx: &GatewayContext,
    conn: Option<&ConnHandle>,
) -> AppResult<Value> {
    match request {
        GatewayRequest::Ping => AppResult::ok(json!({"pong": true})),

        GatewayRequest::Health => AppResult::ok(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": ctx.store.session_count(),
        })),

        GatewayRequest::CreateSession {
            actor_id,
            title,
            display_name,
        } => {
            let mut errors = Vec::new();
            if title.trim().is_empty() {
                errors.push(ValidationError {
                    property_name: "title".into(),
                    error_message: "must not be empty".into(),
                });
            }
            if actor_id.trim().is_empty() {
                errors.push(ValidationError {
                    property_name: "actorId".into(),
                    error_message: "must not be empty".into(),
                });
            }
            if !errors.is_empty() {
                return AppResult::invalid("validation failed", errors);
            }
            match ctx
                .store
                .create_session(&title, &actor_id, display_name.as_deref())
            {
                Ok(session) => AppResult::ok(json!({ "session": session })),
                Err(e) => failure(&e),
            }
        }

        GatewayRequest::GetSession { session_id } => {
            match ctx.store.lock_session(session_id).await {
                Ok(record) => AppResult::ok(json!({
                    "session": record.session.clone(),
                    "participants": record.participants.clone(),
                    "noteCount": record.notes.len(),
                })),
                Err(e) => failure(&e),
            }
        }

        GatewayRequest::ListSessions { page, page_size } => {
            let (page, page_size) = page_params(ctx, page, page_size);
            match ctx.store.list_sessions().await {
                Ok(sessions) => ok_value(&PagedResults::paginate(sessions, page, page_size)),
                Err(e) => failure(&e),
            }
        }

        GatewayRequest::StartSession {
            actor_id,
            session_id,
        } => {
            transition_reply(
                lifecycle::start_session(&ctx.store, &ctx.hub, session_id, &actor_id).await,
            )
        }

        GatewayRequest::CompleteSession {
            actor_id,
            session_id,
        } => {
            transition_reply(
                lifecycle::complete_session(&ctx.store, &ctx.hub, session_id, &actor_id).await,
            )
        }

        GatewayRequest::CloseSession {
            actor_id,
            session_id,
        } => {
            transition_reply(
                lifecycle::close_session(&ctx.store, &ctx.hub, session_id, &actor_id).await,
            )
        }

        GatewayRequest::Join {
            actor_id,
            session_id,
            display_name,
        } => {
            match ctx
                .presence
                .on_connect(session_id, &actor_id, display_name.as_deref())
                .await
            {
                Ok(participant) => {
                    if let Some(conn) = conn {
                        ctx.hub.subscribe(conn.id, session_id);
                        conn.record_join(session_id, &actor_id);
                    }
                    AppResult::ok(json!({ "participant": participant }))
                }
                Err(e) => failure(&e),
            }
        }

        GatewayRequest::Leave {
            actor_id,
            session_id,
        } => {
            if let Some(conn) = conn {
                ctx.hub.unsubscribe(conn.id, session_id);
                conn.record_leave(session_id);
            }
            ctx.presence.on_disconnect(session_id, &actor_id);
            AppResult::ok(json!({"left": true}))
        }

        GatewayRequest::AppendNote {
            actor_id,
            session_id,
            body,
            note_type,
        } => {
            if body.trim().is_empty() {
                return AppResult::invalid(
                    "validation failed",
                    vec![ValidationError {
                        property_name: "body".into(),
                        error_message: "must not be empty".into(),
                    }],
                );
            }
            let note_type = match NoteType::parse(&note_type) {
                Some(t) => t,
                None => {
                    return AppResult::invalid(
                        format!("unknown note type: {}", note_type),
                        vec![ValidationError {
                            property_name: "noteType".into(),
                            error_message:
                                "expected one of General, Decision, ActionItem, KeyPoint".into(),
                        }],
                    );
                }
            };
            match ledger::append_note(&ctx.store, &ctx.hub, session_id, &actor_id, &body, note_type)
                .await
            {
                Ok(note) => AppResult::ok(json!({ "note": note })),
                Err(e) => failure(&e),
            }
        }

        GatewayRequest::ListNotes {
            session_id,
            after_sequence,
            page,
            page_size,
        } => {
            let (page, page_size) = page_params(ctx, page, page_size);
            match ledger::list_notes(&ctx.store, session_id, after_sequence).await {
                Ok(notes) => ok_value(&PagedResults::paginate(notes, page, page_size)),
                Err(e) => failure(&e),
            }
        }

        GatewayRequest::ListParticipants { session_id } => {
            match ctx.store.lock_session(session_id).await {
                Ok(record) => {
                    let participants = record.participants.clone();
                    let page_size = ctx.config.gateway.max_page_size;
                    ok_value(&PagedResults::paginate(participants, 1, page_size))
                }
                Err(e) => failure(&e),
            }
        }

        GatewayRequest::ActiveParticipants { session_id } => {
            // Informational view over the presence index; verify the session
            // exists so unknown ids still map to NOT_FOUND.
            match ctx.store.lock_session(session_id).await {
                Ok(_) => AppResult::ok(json!({
                    "sessionId": session_id,
                    "activeUserIds": ctx.presence.list_active(session_id),
                })),
                Err(e) => failure(&e),
            }
        }

        GatewayRequest::ExportSession { session_id } => {
            match export::session_snapshot(&ctx.store, session_id).await {
                Ok(snapshot) => ok_value(&snapshot),
                Err(e) => failure(&e),
            }
        }

        GatewayRequest::Subscribe { session_id } => match conn {
            Some(conn) => {
                ctx.hub.subscribe(conn.id, session_id);
                AppResult::ok(json!({"subscribed": true}))
            }
            None => AppResult::err(
                "INVALID_ARGUMENT",
                "subscriptions require a realtime connection",
            ),
        },

        GatewayRequest::Unsubscribe { session_id } => match conn {
            Some(conn) => {
                ctx.hub.unsubscribe(conn.id, session_id);
                AppResult::ok(json!({"subscribed": false}))
            }
            None => AppResult::err(
                "INVALID_ARGUMENT",
                "subscriptions require a realtime connection",
            ),
        },
    }
}

fn transition_reply(
    result: Result<lifecycle::TransitionOutcome, SessionError>,
) -> AppResult<Value> {
    match result {
        Ok(outcome) => AppResult::ok(json!({
            "session": outcome.session,
            "participantCount": outcome.participant_count,
            "noteCount": outcome.note_count,
        })),
        Err(e) => failure(&e),
    }
}

fn failure(e: &SessionError) -> AppResult<Value> {
    AppResult::err(e.code(), e.to_string())
}

fn ok_value<T: Serialize>(data: &T) -> AppResult<Value> {
    match serde_json::to_value(data) {
        Ok(v) => AppResult::ok(v),
        Err(e) => {
            tracing::error!("Failed to serialize response data: {}", e);
            AppResult::err("INTERNAL", "internal serialization failure")
        }
    }
}

fn page_params(ctx: &GatewayContext, page: Option<u32>, page_size: Option<u32>) -> (u32, u32) {
    let gateway = &ctx.config.gateway;
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size
        .unwrap_or(gateway.default_page_size)
        .clamp(1, gateway.max_page_size);
    (page, page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ctx() -> GatewayContext {
        GatewayContext::new(PercolateConfig::default())
    }

    async fn create(ctx: &GatewayContext, title: &str, facilitator: &str) -> Uuid {
        let reply = handle_request(
            GatewayRequest::CreateSession {
                actor_id: facilitator.into(),
                title: title.into(),
                display_name: None,
            },
            ctx,
            None,
        )
        .await;
        assert!(reply.success, "create failed: {:?}", reply);
        let id = reply.data.unwrap()["session"]["id"]
            .as_str()
            .unwrap()
            .to_string();
        id.parse().unwrap()
    }

    #[tokio::test]
    async fn test_create_with_empty_title_returns_validation_errors() {
        let ctx = ctx();
        let reply = handle_request(
            GatewayRequest::CreateSession {
                actor_id: "fac-1".into(),
                title: "  ".into(),
                display_name: None,
            },
            &ctx,
            None,
        )
        .await;
        assert!(!reply.success);
        assert_eq!(reply.error_code.as_deref(), Some("INVALID_ARGUMENT"));
        let errors = reply.validation_errors.unwrap();
        assert_eq!(errors[0].property_name, "title");
    }

    #[tokio::test]
    async fn test_forbidden_transition_maps_to_envelope() {
        let ctx = ctx();
        let session_id = create(&ctx, "retro", "fac-1").await;

        let reply = handle_request(
            GatewayRequest::StartSession {
                actor_id: "intruder".into(),
                session_id,
            },
            &ctx,
            None,
        )
        .await;
        assert!(!reply.success);
        assert_eq!(reply.error_code.as_deref(), Some("FORBIDDEN"));
        assert!(reply.message.is_some());
        assert!(reply.data.is_none());
    }

    #[tokio::test]
    async fn test_unknown_note_type_is_invalid_argument() {
        let ctx = ctx();
        let session_id = create(&ctx, "retro", "fac-1").await;

        let reply = handle_request(
            GatewayRequest::AppendNote {
                actor_id: "fac-1".into(),
                session_id,
                body: "something".into(),
                note_type: "Todo".into(),
            },
            &ctx,
            None,
        )
        .await;
        assert!(!reply.success);
        assert_eq!(reply.error_code.as_deref(), Some("INVALID_ARGUMENT"));
        let errors = reply.validation_errors.unwrap();
        assert_eq!(errors[0].property_name, "noteType");
    }

    #[tokio::test]
    async fn test_subscribe_requires_realtime_connection() {
        let ctx = ctx();
        let session_id = create(&ctx, "retro", "fac-1").await;

        let reply = handle_request(GatewayRequest::Subscribe { session_id }, &ctx, None).await;
        assert!(!reply.success);
        assert_eq!(reply.error_code.as_deref(), Some("INVALID_ARGUMENT"));
    }

    #[tokio::test]
    async fn test_list_notes_is_paged_with_cursor() {
        let ctx = ctx();
        let session_id = create(&ctx, "retro", "fac-1").await;
        handle_request(
            GatewayRequest::Join {
                actor_id: "fac-1".into(),
                session_id,
                display_name: None,
            },
            &ctx,
            None,
        )
        .await;
        handle_request(
            GatewayRequest::StartSession {
                actor_id: "fac-1".into(),
                session_id,
            },
            &ctx,
            None,
        )
        .await;
        for i in 0..5 {
            let reply = handle_request(
                GatewayRequest::AppendNote {
                    actor_id: "fac-1".into(),
                    session_id,
                    body: format!("note {}", i),
                    note_type: "General".into(),
                },
                &ctx,
                None,
            )
            .await;
            assert!(reply.success, "append failed: {:?}", reply);
        }

        let reply = handle_request(
            GatewayRequest::ListNotes {
                session_id,
                after_sequence: Some(2),
                page: Some(1),
                page_size: Some(2),
            },
            &ctx,
            None,
        )
        .await;
        assert!(reply.success);
        let data = reply.data.unwrap();
        assert_eq!(data["totalCount"], 3);
        assert_eq!(data["totalPages"], 2);
        assert_eq!(data["currentPage"], 1);
        assert_eq!(data["pageSize"], 2);
        assert_eq!(data["items"][0]["sequence"], 3);
        assert_eq!(data["items"][1]["sequence"], 4);
    }

    #[tokio::test]
    async fn test_get_session_returns_snapshot_with_participants() {
        let ctx = ctx();
        let session_id = create(&ctx, "retro", "fac-1").await;

        let reply = handle_request(GatewayRequest::GetSession { session_id }, &ctx, None).await;
        assert!(reply.success);
        let data = reply.data.unwrap();
        assert_eq!(data["session"]["status"], "Draft");
        assert_eq!(data["participants"][0]["userId"], "fac-1");
        assert_eq!(data["noteCount"], 0);
    }

    #[tokio::test]
    async fn test_unknown_session_maps_to_not_found() {
        let ctx = ctx();
        let reply = handle_request(
            GatewayRequest::GetSession {
                session_id: Uuid::new_v4(),
            },
            &ctx,
            None,
        )
        .await;
        assert!(!reply.success);
        assert_eq!(reply.error_code.as_deref(), Some("NOT_FOUND"));
    }
}
