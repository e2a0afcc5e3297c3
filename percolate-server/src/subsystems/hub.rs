//! Broadcast Hub — fans session events out to subscribed connections.
//!
//! Interest sets are ephemeral: a connection registers with an unbounded
//! outbound channel, subscribes to any number of sessions, and is torn down on
//! disconnect. `publish` is fire-and-forget relative to the committing
//! mutation — sends never block, and a dead receiver is pruned rather than
//! stalling the committer. Callers publish while still holding the session
//! lock, so per-session delivery order equals commit order.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use percolate_core::ipc::ServerMessage;
use percolate_core::models::SessionEvent;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub type ConnId = u64;

/// Hook for the external push-notification collaborator: sees every event
/// regardless of connection subscriptions.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &SessionEvent);
}

struct Subscriber {
    tx: UnboundedSender<ServerMessage>,
    sessions: HashSet<Uuid>,
}

#[derive(Default)]
struct HubInner {
    subscribers: HashMap<ConnId, Subscriber>,
    by_session: HashMap<Uuid, HashSet<ConnId>>,
}

#[derive(Default)]
pub struct BroadcastHub {
    inner: Mutex<HubInner>,
    sinks: Mutex<Vec<Box<dyn EventSink>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn: ConnId, tx: UnboundedSender<ServerMessage>) {
        let mut inner = self.inner.lock().expect("hub poisoned");
        inner.subscribers.insert(
            conn,
            Subscriber {
                tx,
                sessions: HashSet::new(),
            },
        );
    }

    /// Tear down a connection and all of its interest sets.
    pub fn unregister(&self, conn: ConnId) {
        let mut inner = self.inner.lock().expect("hub poisoned");
        if let Some(sub) = inner.subscribers.remove(&conn) {
            for session_id in sub.sessions {
                if let Some(conns) = inner.by_session.get_mut(&session_id) {
                    conns.remove(&conn);
                    if conns.is_empty() {
                        inner.by_session.remove(&session_id);
                    }
                }
            }
        }
    }

    pub fn subscribe(&self, conn: ConnId, session_id: Uuid) -> bool {
        let mut inner = self.inner.lock().expect("hub poisoned");
        match inner.subscribers.get_mut(&conn) {
            Some(sub) => {
                sub.sessions.insert(session_id);
                inner.by_session.entry(session_id).or_default().insert(conn);
                true
            }
            None => false,
        }
    }

    pub fn unsubscribe(&self, conn: ConnId, session_id: Uuid) {
        let mut inner = self.inner.lock().expect("hub poisoned");
        if let Some(sub) = inner.subscribers.get_mut(&conn) {
            sub.sessions.remove(&session_id);
        }
        if let Some(conns) = inner.by_session.get_mut(&session_id) {
            conns.remove(&conn);
            if conns.is_empty() {
                inner.by_session.remove(&session_id);
            }
        }
    }

    /// Register an external sink (push-notification collaborator).
    pub fn register_sink(&self, sink: Box<dyn EventSink>) {
        self.sinks.lock().expect("hub sinks poisoned").push(sink);
    }

    /// Deliver `event` to every connection currently subscribed to its
    /// session. At-least-once, non-blocking; connections whose channel is
    /// gone are pruned.
    pub fn publish(&self, event: &SessionEvent) {
        let session_id = event.session_id();
        let mut dead: Vec<ConnId> = Vec::new();

        {
            let inner = self.inner.lock().expect("hub poisoned");
            if let Some(conns) = inner.by_session.get(&session_id) {
                for conn in conns {
                    if let Some(sub) = inner.subscribers.get(conn) {
                        let msg = ServerMessage::Event {
                            event: event.clone(),
                        };
                        if sub.tx.send(msg).is_err() {
                            dead.push(*conn);
                        }
                    }
                }
            }
        }

        for conn in dead {
            tracing::debug!("Pruning dead subscriber connection {}", conn);
            self.unregister(conn);
        }

        let sinks = self.sinks.lock().expect("hub sinks poisoned");
        for sink in sinks.iter() {
            sink.deliver(event);
        }
    }

    pub fn subscriber_count(&self, session_id: Uuid) -> usize {
        let inner = self.inner.lock().expect("hub poisoned");
        inner
            .by_session
            .get(&session_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}
