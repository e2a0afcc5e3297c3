//! Presence Tracker — derived connectivity state per (session, user).
//!
//! The tracker owns an in-memory index rebuilt from connection signals; it is
//! explicitly outside the store's transactional boundary and never persisted
//! as ground truth. Disconnects are finalized only after a grace period so a
//! brief network blip does not flap a participant between active and inactive
//! or cause event storms. Cancellation works by generation counter (`epoch`):
//! a reconnect bumps the epoch, and a pending grace timer whose epoch no
//! longer matches simply does nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use percolate_core::config::PresenceConfig;
use percolate_core::error::SessionError;
use percolate_core::models::{Participant, ParticipantRole, SessionEvent};
use tokio::sync::broadcast;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use uuid::Uuid;

use super::hub::BroadcastHub;
use super::store::SessionStore;

#[derive(Debug, Clone)]
struct PresenceEntry {
    active: bool,
    last_seen: DateTime<Utc>,
    /// Bumped on every connect/disconnect; stale grace timers compare against
    /// it and abort.
    epoch: u64,
    /// Live connection count for this (session, user). A user with several
    /// tabs open stays active until the last one drops.
    connections: u32,
}

pub struct PresenceTracker {
    store: Arc<SessionStore>,
    hub: Arc<BroadcastHub>,
    config: PresenceConfig,
    entries: Mutex<HashMap<(Uuid, String), PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new(store: Arc<SessionStore>, hub: Arc<BroadcastHub>, config: PresenceConfig) -> Self {
        Self {
            store,
            hub,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Handle a connect signal. Upserts the durable Participant row on
    /// first-ever join (role defaults to Attendee unless the user is the
    /// session's facilitator) and emits `ParticipantJoined`; a returning
    /// participant gets the lighter `PresenceChanged` signal instead.
    /// First-ever joins of a Closed session are rejected; a returning
    /// participant may still reconnect to view it.
    pub async fn on_connect(
        &self,
        session_id: Uuid,
        user_id: &str,
        display_name: Option<&str>,
    ) -> Result<Participant, SessionError> {
        let mut record = self.store.lock_session(session_id).await?;
        let facilitator_id = record.session.facilitator_id.clone();

        let existing = record
            .participants
            .iter()
            .position(|p| p.user_id == user_id);

        let snapshot = match existing {
            Some(i) => {
                let p = &mut record.participants[i];
                let was_active = p.is_active;
                p.is_active = true;
                p.left_at = None;
                let snapshot = p.clone();
                if !was_active {
                    self.hub.publish(&SessionEvent::PresenceChanged {
                        session_id,
                        user_id: user_id.to_string(),
                        active: true,
                    });
                }
                snapshot
            }
            None => {
                if record.session.status.is_terminal() {
                    return Err(SessionError::SessionClosed);
                }
                let role = if user_id == facilitator_id {
                    ParticipantRole::Facilitator
                } else {
                    ParticipantRole::Attendee
                };
                let participant =
                    Participant::new(user_id, display_name.unwrap_or(user_id), role);
                record.participants.push(participant.clone());
                tracing::info!("{} joined session {} as {:?}", user_id, session_id, role);
                self.hub.publish(&SessionEvent::ParticipantJoined {
                    session_id,
                    participant: participant.clone(),
                });
                participant
            }
        };

        // Index update happens under the session lock so a pending grace
        // timer cannot interleave between the row upsert and the epoch bump.
        let mut entries = self.entries.lock().expect("presence index poisoned");
        let entry = entries
            .entry((session_id, user_id.to_string()))
            .or_insert(PresenceEntry {
                active: true,
                last_seen: Utc::now(),
                epoch: 0,
                connections: 0,
            });
        entry.active = true;
        entry.last_seen = Utc::now();
        entry.epoch += 1;
        entry.connections += 1;

        Ok(snapshot)
    }

    /// Handle a disconnect signal: schedule the mark-inactive action after
    /// the grace period. A reconnect before expiry cancels it; no
    /// `ParticipantLeft` is emitted in that case. Dropping one of several
    /// live connections only decrements the count and finalizes nothing.
    pub fn on_disconnect(self: &Arc<Self>, session_id: Uuid, user_id: &str) {
        let epoch = {
            let mut entries = self.entries.lock().expect("presence index poisoned");
            let entry = match entries.get_mut(&(session_id, user_id.to_string())) {
                Some(e) => e,
                None => return, // never connected, nothing to finalize
            };
            entry.last_seen = Utc::now();
            entry.epoch += 1;
            entry.connections = entry.connections.saturating_sub(1);
            if entry.connections > 0 {
                return; // another tab is still connected
            }
            entry.epoch
        };

        let tracker = Arc::clone(self);
        let user_id = user_id.to_string();
        let grace = Duration::from_millis(self.config.grace_period_ms);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            tracker.finalize_disconnect(session_id, &user_id, epoch).await;
        });
    }

    async fn finalize_disconnect(&self, session_id: Uuid, user_id: &str, epoch: u64) {
        // The session lock may be contended; retry a few times before giving
        // up. Presence is rebuildable, so giving up only delays the
        // ParticipantLeft signal until the eviction sweep or the next signal.
        let strategy = FixedInterval::from_millis(50).take(3);
        let result = Retry::spawn(strategy, || self.try_finalize(session_id, user_id, epoch)).await;
        if let Err(e) = result {
            tracing::warn!(
                "Failed to finalize disconnect of {} from session {}: {}",
                user_id,
                session_id,
                e
            );
        }
    }

    async fn try_finalize(
        &self,
        session_id: Uuid,
        user_id: &str,
        epoch: u64,
    ) -> Result<(), SessionError> {
        let mut record = self.store.lock_session(session_id).await?;

        {
            let mut entries = self.entries.lock().expect("presence index poisoned");
            match entries.get_mut(&(session_id, user_id.to_string())) {
                Some(entry) if entry.epoch == epoch && entry.connections == 0 => {
                    entry.active = false
                }
                // Reconnected within the grace period (or evicted) — cancel.
                _ => return Ok(()),
            }
        }

        if let Some(p) = record.participant_mut(user_id) {
            if p.is_active {
                p.is_active = false;
                p.left_at = Some(Utc::now());
                let snapshot = p.clone();
                tracing::info!("{} left session {}", user_id, session_id);
                self.hub.publish(&SessionEvent::ParticipantLeft {
                    session_id,
                    participant: snapshot,
                });
            }
        }
        Ok(())
    }

    /// Currently active user ids for a session. Informational; the ledger's
    /// authorization check reads the durable participant rows.
    pub fn list_active(&self, session_id: Uuid) -> Vec<String> {
        let entries = self.entries.lock().expect("presence index poisoned");
        let mut active: Vec<String> = entries
            .iter()
            .filter(|((sid, _), entry)| *sid == session_id && entry.active)
            .map(|((_, uid), _)| uid.clone())
            .collect();
        active.sort();
        active
    }

    /// TTL eviction of long-inactive entries. The index is a derived view;
    /// evicted users are re-admitted by their next connect signal.
    pub fn evict_idle(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::minutes(self.config.idle_eviction_minutes as i64);
        let mut entries = self.entries.lock().expect("presence index poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.active || entry.last_seen > cutoff);
        before - entries.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.entries.lock().expect("presence index poisoned").len()
    }
}

/// Background eviction loop, shut down via the broadcast channel like the
/// other long-running subsystems.
pub async fn run_presence_sweeper(
    tracker: Arc<PresenceTracker>,
    interval_seconds: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = Duration::from_secs(interval_seconds.max(1));
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let evicted = tracker.evict_idle();
                if evicted > 0 {
                    tracing::debug!("Presence sweep evicted {} idle entries", evicted);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Presence sweeper shutting down...");
                break;
            }
        }
    }
}
