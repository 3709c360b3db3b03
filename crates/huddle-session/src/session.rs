//! A client's live session in one room.
//!
//! A [`ClientSession`] owns everything a connected client keeps running:
//!
//! - a [`RoomCache`] holding its copy of the room,
//! - a heartbeat task that keeps its presence record fresh,
//! - a follower task that applies broadcast patches to the cache.
//!
//! Both tasks start in [`ClientSession::start`] and stop together:
//!
//! ```text
//!   start ──→ heartbeat task ─┐
//!         └─→ follower task ──┤
//!                             ├── close(): signal, await, write offline
//!                             └── drop:    abort
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use huddle_protocol::{ConnectionId, PlayerId, PresenceWrite, Room, RoomId, Timestamp};
use huddle_store::{Clock, PatchBroadcast, PatchReceiver, PresenceSink};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::auth::generate_token;
use crate::host::{resolve_host, RosterEntry};
use crate::{RoomCache, SessionError};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for client session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the heartbeat task writes an online record.
    ///
    /// Keep this well under the presence `stale_ms`, or a healthy client
    /// will flicker offline between beats.
    pub heartbeat_interval: Duration,

    /// How long a host who went quiet keeps the role in
    /// [`ClientSession::fallback_host`].
    pub host_grace_ms: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            host_grace_ms: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

/// One participant's connection to one room.
pub struct ClientSession<P: PresenceSink> {
    player_id: PlayerId,
    room_id: RoomId,
    connection_id: ConnectionId,
    cache: Arc<RoomCache>,
    presence: Arc<P>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    shutdown: watch::Sender<bool>,
    heartbeat: Option<JoinHandle<()>>,
    follower: Option<JoinHandle<()>>,
}

impl<P: PresenceSink> ClientSession<P> {
    /// Seeds the cache with `room` and starts the background tasks.
    ///
    /// The first heartbeat is written immediately.
    pub async fn start<B: PatchBroadcast>(
        player_id: PlayerId,
        room: Room,
        presence: Arc<P>,
        broadcast: &B,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let room_id = room.id.clone();
        let connection_id = ConnectionId::new(generate_token());
        let cache = Arc::new(RoomCache::with_room(room));
        let (shutdown, _) = watch::channel(false);

        let patches = broadcast.subscribe(&room_id).await;
        let follower = tokio::spawn(follow_patches(
            Arc::clone(&cache),
            patches,
            shutdown.subscribe(),
        ));

        let heartbeat = tokio::spawn(send_heartbeats(
            HeartbeatTarget {
                presence: Arc::clone(&presence),
                clock: Arc::clone(&clock),
                write: PresenceWrite {
                    connection_id: connection_id.clone(),
                    participant_id: player_id.clone(),
                    room_id: room_id.clone(),
                    online: true,
                    server_timestamp: 0,
                },
            },
            config.heartbeat_interval,
            shutdown.subscribe(),
        ));

        tracing::info!(%room_id, %player_id, %connection_id, "client session started");
        Self {
            player_id,
            room_id,
            connection_id,
            cache,
            presence,
            clock,
            config,
            shutdown,
            heartbeat: Some(heartbeat),
            follower: Some(follower),
        }
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// The session's room cache.
    pub fn cache(&self) -> &Arc<RoomCache> {
        &self.cache
    }

    /// Runs the host resolver over the cached roster.
    ///
    /// `online` is `None` while presence isn't ready; `last_seen` holds
    /// the latest presence timestamp per participant, where known.
    pub fn fallback_host(
        &self,
        online: Option<&BTreeSet<PlayerId>>,
        last_seen: &BTreeMap<PlayerId, Timestamp>,
        now: Timestamp,
    ) -> Option<PlayerId> {
        let room = self.cache.read()?;
        let roster: Vec<RosterEntry> = room
            .seats
            .iter()
            .map(|seat| RosterEntry {
                last_seen_at: last_seen.get(&seat.id).copied(),
                ..RosterEntry::from(seat)
            })
            .collect();
        resolve_host(
            &roster,
            room.host_id.as_ref(),
            online,
            now,
            self.config.host_grace_ms,
        )
    }

    /// Stops both tasks, waits for them, and writes an offline record.
    ///
    /// # Errors
    /// [`SessionError::Task`] if a task panicked, or the store error from
    /// the offline write.
    pub async fn close(mut self) -> Result<(), SessionError> {
        // Receivers may already be gone if both tasks ended on their own.
        let _ = self.shutdown.send(true);

        for handle in [self.heartbeat.take(), self.follower.take()].into_iter().flatten() {
            handle
                .await
                .map_err(|e| SessionError::Task(e.to_string()))?;
        }

        self.presence
            .record(PresenceWrite {
                connection_id: self.connection_id.clone(),
                participant_id: self.player_id.clone(),
                room_id: self.room_id.clone(),
                online: false,
                server_timestamp: self.clock.now_ms(),
            })
            .await?;

        tracing::info!(room_id = %self.room_id, player_id = %self.player_id, "client session closed");
        Ok(())
    }
}

impl<P: PresenceSink> Drop for ClientSession<P> {
    fn drop(&mut self) {
        for handle in [self.heartbeat.take(), self.follower.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

struct HeartbeatTarget<P: PresenceSink> {
    presence: Arc<P>,
    clock: Arc<dyn Clock>,
    /// Template; the timestamp is restamped on every beat.
    write: PresenceWrite,
}

async fn send_heartbeats<P: PresenceSink>(
    target: HeartbeatTarget<P>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let write = PresenceWrite {
                    server_timestamp: target.clock.now_ms(),
                    ..target.write.clone()
                };
                if let Err(e) = target.presence.record(write).await {
                    tracing::warn!(
                        room_id = %target.write.room_id,
                        player_id = %target.write.participant_id,
                        error = %e,
                        "heartbeat write failed"
                    );
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn follow_patches(
    cache: Arc<RoomCache>,
    mut patches: PatchReceiver,
    mut shutdown: watch::Receiver<bool>,
) {
    // Whatever was published before we subscribed.
    let initial = patches.borrow_and_update().clone();
    if let Some(patch) = initial {
        let _ = cache.apply(&patch);
    }

    loop {
        tokio::select! {
            changed = patches.changed() => {
                if changed.is_err() {
                    tracing::debug!("patch channel closed");
                    break;
                }
                let latest = patches.borrow_and_update().clone();
                let Some(patch) = latest else { continue };
                match cache.apply(&patch) {
                    Ok(version) => tracing::trace!(
                        room_id = %patch.room_id,
                        status_version = version,
                        "patch applied"
                    ),
                    Err(rejection) => tracing::debug!(
                        room_id = %patch.room_id,
                        %rejection,
                        "patch skipped"
                    ),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
