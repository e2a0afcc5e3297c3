//! Realtime gateway over a Unix socket.
//!
//! Frames are 4-byte little-endian length prefix + MessagePack payload.
//! Requests on a connection are handled sequentially; replies and subscribed
//! session events ride the same per-connection channel, so the client
//! observes them in the order the gateway produced them. A slow client only
//! backs up its own channel and never stalls a committing mutation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use percolate_core::ipc::{AppResult, GatewayRequest, ServerMessage};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use uuid::Uuid;

use crate::router::{self, GatewayContext};
use crate::subsystems::hub::ConnId;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Per-connection bookkeeping: which sessions this connection joined, and as
/// whom, so socket teardown can emit the right disconnect signals.
pub struct ConnHandle {
    pub id: ConnId,
    joined: Mutex<HashMap<Uuid, String>>,
}

impl ConnHandle {
    fn new(id: ConnId) -> Self {
        Self {
            id,
            joined: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_join(&self, session_id: Uuid, user_id: &str) {
        self.joined
            .lock()
            .expect("conn state poisoned")
            .insert(session_id, user_id.to_string());
    }

    pub fn record_leave(&self, session_id: Uuid) {
        self.joined
            .lock()
            .expect("conn state poisoned")
            .remove(&session_id);
    }

    fn drain_joined(&self) -> Vec<(Uuid, String)> {
        self.joined
            .lock()
            .expect("conn state poisoned")
            .drain()
            .collect()
    }
}

pub async fn run_unix_server(
    socket_path: &str,
    ctx: Arc<GatewayContext>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("Realtime gateway listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let ctx = ctx.clone();
                tokio::spawn(handle_connection(stream, ctx));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down realtime gateway...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}

async fn handle_connection(stream: UnixStream, ctx: Arc<GatewayContext>) {
    let conn = Arc::new(ConnHandle::new(NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)));
    let (read, write) = stream.into_split();
    // 4-byte Little Endian length prefix + MessagePack payload
    let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    ctx.hub.register(conn.id, tx.clone());
    tracing::debug!("Connection {} established", conn.id);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match rmp_serde::to_vec_named(&msg) {
                Ok(bytes) => {
                    if framed_write.send(Bytes::from(bytes)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize outbound frame: {}", e);
                    break;
                }
            }
        }
    });

    while let Some(frame) = framed_read.next().await {
        match frame {
            Ok(bytes_mut) => {
                let request: GatewayRequest = match rmp_serde::from_slice(&bytes_mut) {
                    Ok(req) => req,
                    Err(e) => {
                        let reply = ServerMessage::Reply {
                            result: AppResult::err(
                                "INVALID_ARGUMENT",
                                format!("Deserialization error: {}", e),
                            ),
                        };
                        if tx.send(reply).is_err() {
                            break;
                        }
                        continue;
                    }
                };

                let result = router::handle_request(request, &ctx, Some(&conn)).await;
                if tx.send(ServerMessage::Reply { result }).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Frame error on connection {}: {}", conn.id, e);
                break;
            }
        }
    }

    // Socket teardown is a disconnect signal for every joined session; the
    // grace period decides whether a ParticipantLeft follows.
    for (session_id, user_id) in conn.drain_joined() {
        ctx.presence.on_disconnect(session_id, &user_id);
    }
    ctx.hub.unregister(conn.id);
    drop(tx);
    let _ = writer.await;
    tracing::debug!("Connection {} closed", conn.id);
}

/// One-shot Ping over the socket, used by the `--health` flag.
pub async fn ping_socket(socket_path: &str) -> anyhow::Result<()> {
    let stream = UnixStream::connect(socket_path).await?;
    let (read, write) = stream.into_split();
    let le_codec = || LengthDelimitedCodec::builder().little_endian().new_codec();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    let payload = rmp_serde::to_vec_named(&GatewayRequest::Ping)?;
    framed_write.send(Bytes::from(payload)).await?;

    let frame = framed_read
        .next()
        .await
        .ok_or_else(|| anyhow::anyhow!("connection closed before reply"))??;
    let msg: ServerMessage = rmp_serde::from_slice(&frame)?;
    match msg {
        ServerMessage::Reply { result } if result.success => Ok(()),
        other => Err(anyhow::anyhow!("unexpected reply: {:?}", other)),
    }
}
