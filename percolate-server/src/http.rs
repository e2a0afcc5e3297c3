//! HTTP REST surface of the session gateway.
//!
//! Axum-based, running alongside the Unix-socket realtime channel. Each
//! endpoint is a thin axum handler delegating to a directly-testable inner
//! function that builds a `GatewayRequest` and dispatches through the router,
//! so both surfaces share one authorization and error-mapping path.
//!
//! Actor identity arrives in the `x-user-id` header, injected by the external
//! identity collaborator; a mutating call without it is rejected with 401 at
//! this layer (the frontend's re-authentication interceptor contract). The
//! core never sees an unidentified mutation.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use percolate_core::ipc::{AppResult, GatewayRequest};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::router::{self, GatewayContext};

/// Build the Axum router with all endpoints
pub fn build_router(ctx: Arc<GatewayContext>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/sessions", post(create_session_handler).get(list_sessions_handler))
        .route("/sessions/:id", get(get_session_handler))
        .route("/sessions/:id/start", post(start_handler))
        .route("/sessions/:id/complete", post(complete_handler))
        .route("/sessions/:id/close", post(close_handler))
        .route("/sessions/:id/join", post(join_handler))
        .route("/sessions/:id/leave", post(leave_handler))
        .route("/sessions/:id/notes", post(append_note_handler).get(list_notes_handler))
        .route("/sessions/:id/participants", get(participants_handler))
        .route("/sessions/:id/participants/active", get(active_participants_handler))
        .route("/sessions/:id/export", get(export_handler))
        .with_state(ctx)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    ctx: Arc<GatewayContext>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.http.host, ctx.config.http.port);
    let app = build_router(ctx);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Percolate HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionBody {
    pub title: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBody {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendNoteBody {
    pub body: Option<String>,
    pub note_type: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub after_sequence: Option<u64>,
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

/// Map the envelope to a transport status. The envelope itself is always the
/// body; the status code is a convenience for HTTP middleware.
pub fn status_for(result: &AppResult<Value>) -> StatusCode {
    if result.success {
        return StatusCode::OK;
    }
    match result.error_code.as_deref() {
        Some("FORBIDDEN") => StatusCode::FORBIDDEN,
        Some("NOT_FOUND") => StatusCode::NOT_FOUND,
        Some("INVALID_TRANSITION") | Some("SESSION_CLOSED") => StatusCode::CONFLICT,
        Some("INVALID_ARGUMENT") => StatusCode::BAD_REQUEST,
        Some("BUSY") => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn actor_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn unauthorized() -> (StatusCode, AppResult<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        AppResult::err("UNAUTHORIZED", "missing x-user-id identity header"),
    )
}

async fn dispatch(ctx: &GatewayContext, request: GatewayRequest) -> (StatusCode, AppResult<Value>) {
    let result = router::handle_request(request, ctx, None).await;
    (status_for(&result), result)
}

pub async fn health_inner(ctx: &GatewayContext) -> (StatusCode, AppResult<Value>) {
    dispatch(ctx, GatewayRequest::Health).await
}

/// Pure, no IO.
pub fn version_inner() -> Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "percolate/1",
    })
}

pub async fn create_session_inner(
    ctx: &GatewayContext,
    actor: Option<String>,
    body: CreateSessionBody,
) -> (StatusCode, AppResult<Value>) {
    let actor_id = match actor {
        Some(a) => a,
        None => return unauthorized(),
    };
    dispatch(
        ctx,
        GatewayRequest::CreateSession {
            actor_id,
            title: body.title.unwrap_or_default(),
            display_name: body.display_name,
        },
    )
    .await
}

pub async fn list_sessions_inner(
    ctx: &GatewayContext,
    query: PageQuery,
) -> (StatusCode, AppResult<Value>) {
    dispatch(
        ctx,
        GatewayRequest::ListSessions {
            page: query.page,
            page_size: query.page_size,
        },
    )
    .await
}

pub async fn get_session_inner(
    ctx: &GatewayContext,
    session_id: Uuid,
) -> (StatusCode, AppResult<Value>) {
    dispatch(ctx, GatewayRequest::GetSession { session_id }).await
}

pub async fn transition_inner(
    ctx: &GatewayContext,
    actor: Option<String>,
    session_id: Uuid,
    verb: TransitionVerb,
) -> (StatusCode, AppResult<Value>) {
    let actor_id = match actor {
        Some(a) => a,
        None => return unauthorized(),
    };
    let request = match verb {
        TransitionVerb::Start => GatewayRequest::StartSession {
            actor_id,
            session_id,
        },
        TransitionVerb::Complete => GatewayRequest::CompleteSession {
            actor_id,
            session_id,
        },
        TransitionVerb::Close => GatewayRequest::CloseSession {
            actor_id,
            session_id,
        },
    };
    dispatch(ctx, request).await
}

#[derive(Debug, Clone, Copy)]
pub enum TransitionVerb {
    Start,
    Complete,
    Close,
}

pub async fn join_inner(
    ctx: &GatewayContext,
    actor: Option<String>,
    session_id: Uuid,
    body: JoinBody,
) -> (StatusCode, AppResult<Value>) {
    let actor_id = match actor {
        Some(a) => a,
        None => return unauthorized(),
    };
    dispatch(
        ctx,
        GatewayRequest::Join {
            actor_id,
            session_id,
            display_name: body.display_name,
        },
    )
    .await
}

pub async fn leave_inner(
    ctx: &GatewayContext,
    actor: Option<String>,
    session_id: Uuid,
) -> (StatusCode, AppResult<Value>) {
    let actor_id = match actor {
        Some(a) => a,
        None => return unauthorized(),
    };
    dispatch(
        ctx,
        GatewayRequest::Leave {
            actor_id,
            session_id,
        },
    )
    .await
}

pub async fn append_note_inner(
    ctx: &GatewayContext,
    actor: Option<String>,
    session_id: Uuid,
    body: AppendNoteBody,
) -> (StatusCode, AppResult<Value>) {
    let actor_id = match actor {
        Some(a) => a,
        None => return unauthorized(),
    };
    dispatch(
        ctx,
        GatewayRequest::AppendNote {
            actor_id,
            session_id,
            body: body.body.unwrap_or_default(),
            note_type: body.note_type.unwrap_or_else(|| "General".to_string()),
        },
    )
    .await
}

pub async fn list_notes_inner(
    ctx: &GatewayContext,
    session_id: Uuid,
    query: PageQuery,
) -> (StatusCode, AppResult<Value>) {
    dispatch(
        ctx,
        GatewayRequest::ListNotes {
            session_id,
            after_sequence: query.after_sequence,
            page: query.page,
            page_size: query.page_size,
        },
    )
    .await
}

pub async fn participants_inner(
    ctx: &GatewayContext,
    session_id: Uuid,
) -> (StatusCode, AppResult<Value>) {
    dispatch(ctx, GatewayRequest::ListParticipants { session_id }).await
}

pub async fn active_participants_inner(
    ctx: &GatewayContext,
    session_id: Uuid,
) -> (StatusCode, AppResult<Value>) {
    dispatch(ctx, GatewayRequest::ActiveParticipants { session_id }).await
}

pub async fn export_inner(
    ctx: &GatewayContext,
    session_id: Uuid,
) -> (StatusCode, AppResult<Value>) {
    dispatch(ctx, GatewayRequest::ExportSession { session_id }).await
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

async fn health_handler(State(ctx): State<Arc<GatewayContext>>) -> impl IntoResponse {
    let (status, body) = health_inner(&ctx).await;
    (status, Json(body))
}

async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

async fn create_session_handler(
    State(ctx): State<Arc<GatewayContext>>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionBody>,
) -> impl IntoResponse {
    let (status, body) = create_session_inner(&ctx, actor_from(&headers), body).await;
    (status, Json(body))
}

async fn list_sessions_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let (status, body) = list_sessions_inner(&ctx, query).await;
    (status, Json(body))
}

async fn get_session_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = get_session_inner(&ctx, id).await;
    (status, Json(body))
}

async fn start_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) =
        transition_inner(&ctx, actor_from(&headers), id, TransitionVerb::Start).await;
    (status, Json(body))
}

async fn complete_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) =
        transition_inner(&ctx, actor_from(&headers), id, TransitionVerb::Complete).await;
    (status, Json(body))
}

async fn close_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) =
        transition_inner(&ctx, actor_from(&headers), id, TransitionVerb::Close).await;
    (status, Json(body))
}

async fn join_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<JoinBody>,
) -> impl IntoResponse {
    let (status, body) = join_inner(&ctx, actor_from(&headers), id, body).await;
    (status, Json(body))
}

async fn leave_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let (status, body) = leave_inner(&ctx, actor_from(&headers), id).await;
    (status, Json(body))
}

async fn append_note_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<AppendNoteBody>,
) -> impl IntoResponse {
    let (status, body) = append_note_inner(&ctx, actor_from(&headers), id, body).await;
    (status, Json(body))
}

async fn list_notes_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let (status, body) = list_notes_inner(&ctx, id, query).await;
    (status, Json(body))
}

async fn participants_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = participants_inner(&ctx, id).await;
    (status, Json(body))
}

async fn active_participants_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = active_participants_inner(&ctx, id).await;
    (status, Json(body))
}

async fn export_handler(
    State(ctx): State<Arc<GatewayContext>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = export_inner(&ctx, id).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use percolate_core::PercolateConfig;

    fn ctx() -> GatewayContext {
        GatewayContext::new(PercolateConfig::default())
    }

    async fn create(ctx: &GatewayContext, facilitator: &str) -> Uuid {
        let (status, result) = create_session_inner(
            ctx,
            Some(facilitator.to_string()),
            CreateSessionBody {
                title: Some("retro".into()),
                display_name: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        result.data.unwrap()["session"]["id"]
            .as_str()
            .unwrap()
            .parse()
            .unwrap()
    }

    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string());
        assert_eq!(v["protocol"], "percolate/1");
    }

    #[tokio::test]
    async fn test_health_inner_reports_session_count() {
        let ctx = ctx();
        let (status, result) = health_inner(&ctx).await;
        assert_eq!(status, StatusCode::OK);
        let data = result.data.unwrap();
        assert_eq!(data["status"], "healthy");
        assert_eq!(data["sessions"], 0);
    }

    #[tokio::test]
    async fn test_mutation_without_identity_is_401() {
        let ctx = ctx();
        let (status, result) = create_session_inner(
            &ctx,
            None,
            CreateSessionBody {
                title: Some("retro".into()),
                display_name: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(result.error_code.as_deref(), Some("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_403() {
        let ctx = ctx();
        let id = create(&ctx, "fac-1").await;
        let (status, result) = transition_inner(
            &ctx,
            Some("intruder".into()),
            id,
            TransitionVerb::Start,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_invalid_transition_maps_to_409() {
        let ctx = ctx();
        let id = create(&ctx, "fac-1").await;
        let (status, result) = transition_inner(
            &ctx,
            Some("fac-1".into()),
            id,
            TransitionVerb::Complete,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(result.error_code.as_deref(), Some("INVALID_TRANSITION"));
    }

    #[tokio::test]
    async fn test_unknown_session_maps_to_404() {
        let ctx = ctx();
        let (status, _) = get_session_inner(&ctx, Uuid::new_v4()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_lifecycle_flow_over_inner_functions() {
        let ctx = ctx();
        let id = create(&ctx, "fac-1").await;

        // Join over HTTP marks presence even without a realtime connection.
        let (status, _) = join_inner(&ctx, Some("fac-1".into()), id, JoinBody { display_name: None }).await;
        assert_eq!(status, StatusCode::OK);

        let (status, result) =
            transition_inner(&ctx, Some("fac-1".into()), id, TransitionVerb::Start).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result.data.unwrap()["session"]["status"], "InProgress");

        let (status, result) = append_note_inner(
            &ctx,
            Some("fac-1".into()),
            id,
            AppendNoteBody {
                body: Some("standup blocker".into()),
                note_type: Some("ActionItem".into()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK, "append failed: {:?}", result);
        assert_eq!(result.data.unwrap()["note"]["sequence"], 1);

        let (status, result) = list_notes_inner(&ctx, id, PageQuery::default()).await;
        assert_eq!(status, StatusCode::OK);
        let data = result.data.unwrap();
        assert_eq!(data["totalCount"], 1);
        assert_eq!(data["items"][0]["noteType"], "ActionItem");
    }

    #[tokio::test]
    async fn test_export_of_live_session_maps_to_409() {
        let ctx = ctx();
        let id = create(&ctx, "fac-1").await;
        let (status, result) = export_inner(&ctx, id).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(result.error_code.as_deref(), Some("INVALID_TRANSITION"));
    }
}
