//! `Engine` builder and request endpoints.
//!
//! The engine is the entry point for a huddle backend. It ties together
//! all the layers: auth → command processor → store → broadcast, plus the
//! presence path (heartbeat sink → aggregator → stable filter).

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use huddle_presence::{Observation, PresenceConfig, PresenceTracker};
use huddle_protocol::{
    Codec, Command, CommandAck, CommandRequest, CommandResponse, CreateRoomRequest, ErrorCode,
    HeartbeatRequest, JsonCodec, PlayerId, PresenceWrite, Room, RoomId, Timestamp,
};
use huddle_room::{CommandConfig, CommandProcessor, Dealer, RandomDealer};
use huddle_session::{Authenticator, TokenTable};
use huddle_store::{
    Clock, DocumentStore, MemoryBroadcast, MemoryPresence, MemoryStore, PatchBroadcast,
    PatchReceiver, PresenceSink, StoreError, SystemClock,
};
use tokio::sync::Mutex;

use crate::HuddleError;

/// Sent when even the error response fails to encode.
const ENCODE_FAILURE: &[u8] = br#"{"error":"internal_error","message":"response encode failed"}"#;

// ---------------------------------------------------------------------------
// PresenceProbe
// ---------------------------------------------------------------------------

/// An out-of-band presence check, such as asking the realtime backend
/// directly who is connected.
///
/// Probes are expensive and may fail for reasons unrelated to the room, so
/// the engine only runs one when the room's verification health allows it
/// (see [`Engine::reverify`]).
///
/// # Example
///
/// ```rust
/// use huddle::PresenceProbe;
/// use huddle::prelude::{RoomId, StoreError};
///
/// /// Never reaches the backend; every check passes.
/// struct AlwaysFine;
///
/// impl PresenceProbe for AlwaysFine {
///     async fn verify(&self, _room_id: &RoomId) -> Result<(), StoreError> {
///         // A real probe would ask the realtime service who is
///         // connected and compare that with the recorded heartbeats.
///         Ok(())
///     }
/// }
/// ```
pub trait PresenceProbe: Send + Sync {
    /// Checks the room's presence data against the source of truth.
    ///
    /// # Errors
    /// Any [`StoreError`]; it counts as a failed verification.
    fn verify(&self, room_id: &RoomId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring an [`Engine`].
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use huddle::prelude::*;
///
/// let engine = Engine::builder()
///     .command_config(CommandConfig {
///         rate_limit_ms: 0,
///         ..CommandConfig::default()
///     })
///     .build(
///         Arc::new(MemoryStore::new()),
///         Arc::new(MemoryBroadcast::new()),
///         Arc::new(MemoryPresence::new()),
///         TokenTable::new(),
///     )
///     .unwrap();
/// assert_eq!(engine.command_config().rate_limit_ms, 0);
/// ```
pub struct EngineBuilder {
    command_config: CommandConfig,
    presence_config: PresenceConfig,
    dealer: Arc<dyn Dealer>,
    clock: Arc<dyn Clock>,
}

impl EngineBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            command_config: CommandConfig::default(),
            presence_config: PresenceConfig::default(),
            dealer: Arc::new(RandomDealer),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the command path configuration.
    pub fn command_config(mut self, config: CommandConfig) -> Self {
        self.command_config = config;
        self
    }

    /// Sets the presence thresholds.
    pub fn presence_config(mut self, config: PresenceConfig) -> Self {
        self.presence_config = config;
        self
    }

    /// Replaces the random dealer.
    pub fn dealer(mut self, dealer: impl Dealer) -> Self {
        self.dealer = Arc::new(dealer);
        self
    }

    /// Replaces the wall clock.
    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Builds the engine over the given collaborators.
    ///
    /// # Errors
    /// [`HuddleError::Config`] if the seat limits are unusable.
    pub fn build<S, B, P, A>(
        self,
        store: Arc<S>,
        broadcast: Arc<B>,
        presence: Arc<P>,
        auth: A,
    ) -> Result<Engine<S, B, P, A>, HuddleError>
    where
        S: DocumentStore,
        B: PatchBroadcast,
        P: PresenceSink,
        A: Authenticator,
    {
        let config = &self.command_config;
        if config.min_players == 0 || config.min_players > config.max_players {
            return Err(HuddleError::Config(format!(
                "min_players {} must be in 1..={}",
                config.min_players, config.max_players
            )));
        }

        let processor = CommandProcessor::new(
            store,
            Arc::clone(&broadcast),
            Arc::clone(&self.clock),
            self.dealer,
            self.command_config,
        );

        Ok(Engine {
            processor,
            broadcast,
            presence,
            auth,
            codec: JsonCodec,
            clock: self.clock,
            presence_config: self.presence_config,
            trackers: Mutex::new(HashMap::new()),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A huddle backend: command, heartbeat and eligibility endpoints over one
/// set of stores.
///
/// The engine is `Send + Sync`; wrap it in an `Arc` and share it between
/// request handlers.
pub struct Engine<S, B, P, A>
where
    S: DocumentStore,
    B: PatchBroadcast,
    P: PresenceSink,
    A: Authenticator,
{
    processor: CommandProcessor<S, B>,
    broadcast: Arc<B>,
    presence: Arc<P>,
    auth: A,
    codec: JsonCodec,
    clock: Arc<dyn Clock>,
    presence_config: PresenceConfig,
    trackers: Mutex<HashMap<RoomId, PresenceTracker>>,
}

impl Engine<MemoryStore, MemoryBroadcast, MemoryPresence, TokenTable> {
    /// Creates a new builder.
    ///
    /// The builder is not tied to these collaborator types; they are fixed
    /// here only so `Engine::builder()` needs no annotations.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }
}

impl<S, B, P, A> Engine<S, B, P, A>
where
    S: DocumentStore,
    B: PatchBroadcast,
    P: PresenceSink,
    A: Authenticator,
{
    pub fn command_config(&self) -> &CommandConfig {
        self.processor.config()
    }

    /// The processor behind [`handle`](Self::handle).
    pub fn processor(&self) -> &CommandProcessor<S, B> {
        &self.processor
    }

    /// Reads the committed room.
    pub async fn room(&self, room_id: &RoomId) -> Result<Room, HuddleError> {
        Ok(self.processor.room(room_id).await?)
    }

    /// A receiver for the room's sync patches.
    pub async fn subscribe(&self, room_id: &RoomId) -> PatchReceiver {
        self.broadcast.subscribe(room_id).await
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Creates a room with the caller seated as host.
    pub async fn create_room(&self, req: CreateRoomRequest) -> Result<CommandAck, HuddleError> {
        let creator = self.auth.authenticate(&req.token).await?;
        let ack = self
            .processor
            .create_room(req.room_id, creator, req.name, req.options)
            .await?;
        Ok(ack)
    }

    /// Authenticates and runs one command.
    pub async fn execute(&self, req: &CommandRequest) -> Result<CommandAck, HuddleError> {
        let actor = self.auth.authenticate(&req.token).await?;
        let ack = self
            .processor
            .execute(&actor, &req.room_id, &req.request_id, &req.command)
            .await?;

        if matches!(req.command, Command::Leave) && !ack.replayed {
            self.forget_participant(&req.room_id, &actor).await;
        }
        Ok(ack)
    }

    /// The command endpoint: every outcome becomes a [`CommandResponse`].
    pub async fn handle(&self, req: CommandRequest) -> CommandResponse {
        match self.execute(&req).await {
            Ok(ack) => CommandResponse::Ok(ack),
            Err(e) => {
                if matches!(e, HuddleError::Session(_)) {
                    tracing::debug!(room_id = %req.room_id, error = %e, "command unauthenticated");
                }
                CommandResponse::error(e.code(), e.to_string())
            }
        }
    }

    /// [`handle`](Self::handle) over raw bytes.
    ///
    /// A body that doesn't decode is answered with `invalid_payload`.
    pub async fn handle_json(&self, body: &[u8]) -> Vec<u8> {
        let response = match self.codec.decode::<CommandRequest>(body) {
            Ok(req) => self.handle(req).await,
            Err(e) => CommandResponse::error(ErrorCode::InvalidPayload, e.to_string()),
        };
        self.codec.encode(&response).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode command response");
            ENCODE_FAILURE.to_vec()
        })
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    /// The heartbeat sink: records one connection's state, stamped with the
    /// server clock.
    ///
    /// The room must exist; heartbeats for unknown rooms are refused with
    /// `room_not_found` and nothing is written.
    pub async fn heartbeat(&self, req: HeartbeatRequest) -> Result<Timestamp, HuddleError> {
        let participant_id = self.auth.authenticate(&req.token).await?;
        self.room(&req.room_id).await?;
        let server_timestamp = self.clock.now_ms();
        tracing::trace!(
            room_id = %req.room_id,
            player_id = %participant_id,
            connection_id = %req.connection_id,
            online = req.online,
            "heartbeat"
        );
        self.presence
            .record(PresenceWrite {
                connection_id: req.connection_id,
                participant_id,
                room_id: req.room_id,
                online: req.online,
                server_timestamp,
            })
            .await?;
        Ok(server_timestamp)
    }

    /// Computes the room's eligibility set from the current heartbeats.
    ///
    /// Only seated participants are considered. The per-room tracker keeps
    /// the grace-period state between calls, so call this on a regular
    /// cadence rather than once.
    pub async fn stable_online(&self, room_id: &RoomId) -> Result<Observation, HuddleError> {
        let room = self.room(room_id).await?;
        let snapshot = self.presence.snapshot(room_id).await?;
        let exclude: BTreeSet<PlayerId> = snapshot
            .keys()
            .filter(|id| !room.is_seated(id))
            .cloned()
            .collect();
        let now = self.clock.now_ms();

        let mut trackers = self.trackers.lock().await;
        let tracker = trackers
            .entry(room_id.clone())
            .or_insert_with(|| PresenceTracker::new(self.presence_config));
        Ok(tracker.observe(&snapshot, now, &exclude))
    }

    /// Distrusts stale signals from `player` until `until`.
    pub async fn quarantine(&self, room_id: &RoomId, player: PlayerId, until: Timestamp) {
        let mut trackers = self.trackers.lock().await;
        trackers
            .entry(room_id.clone())
            .or_insert_with(|| PresenceTracker::new(self.presence_config))
            .quarantine(player, until);
    }

    /// Runs `probe` if the room's verification health allows it.
    ///
    /// Returns `None` when the check was skipped (backoff, open breaker, or
    /// another check already in flight), otherwise whether it succeeded.
    /// The tracker lock is not held while the probe runs; the slot is
    /// claimed before it is released.
    pub async fn reverify<Q: PresenceProbe>(&self, room_id: &RoomId, probe: &Q) -> Option<bool> {
        let now = self.clock.now_ms();
        {
            let mut trackers = self.trackers.lock().await;
            let tracker = trackers
                .entry(room_id.clone())
                .or_insert_with(|| PresenceTracker::new(self.presence_config));
            if !tracker.begin_verification(now) {
                tracing::trace!(%room_id, "presence verification skipped");
                return None;
            }
        }

        let ok = match probe.verify(room_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(%room_id, error = %e, "presence probe failed");
                false
            }
        };

        let mut trackers = self.trackers.lock().await;
        if let Some(tracker) = trackers.get_mut(room_id) {
            tracker.record_verification(ok, now);
        }
        Some(ok)
    }

    /// Drops the transient state kept for a room: its presence tracker,
    /// its recorded heartbeats and its patch channel. Subscribers see the
    /// channel close. The room document is left alone.
    ///
    /// Call this once a room is abandoned; the maps otherwise keep one
    /// entry per room ever seen.
    pub async fn evict_room(&self, room_id: &RoomId) -> Result<(), HuddleError> {
        self.trackers.lock().await.remove(room_id);
        self.broadcast.close(room_id).await;
        self.presence.clear_room(room_id).await?;
        tracing::info!(%room_id, "room state evicted");
        Ok(())
    }

    /// Drops a departed participant's presence so they leave the stable
    /// set now instead of after the grace period.
    async fn forget_participant(&self, room_id: &RoomId, player: &PlayerId) {
        if let Err(e) = self.presence.remove_participant(room_id, player).await {
            tracing::warn!(%room_id, player_id = %player, error = %e, "failed to clear presence");
        }
        let until = self.clock.now_ms() + self.presence_config.stale_ms;
        self.quarantine(room_id, player.clone(), until).await;
    }
}
