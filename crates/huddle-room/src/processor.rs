//! The idempotent command processor.
//!
//! One call to [`CommandProcessor::execute`] is one command's full trip:
//!
//! ```text
//! validate args ─→ acquire lease ─→ transaction(apply) ─→ release lease
//!                                                            │
//!                                    publish SyncPatch ←─────┘ (if applied)
//! ```
//!
//! The processor holds no per-room state of its own. Any number of
//! processors (or processes) can share one store; the lock and the
//! transaction serialize them.

use std::sync::Arc;

use huddle_protocol::{
    Command, CommandAck, CommandKind, PatchMeta, PatchSource, PlayerId, PlayerRecord, RequestId,
    Room, RoomId, RoomOptions, SyncPatch, Timestamp,
};
use huddle_store::{Clock, DocumentStore, PatchBroadcast, RoomDocument, StoreError, TxError};

use crate::lock::CommandLockManager;
use crate::transition::{self, Transition, TransitionContext};
use crate::{CommandConfig, CommandError, Dealer};

/// Applies commands to rooms in the shared store.
pub struct CommandProcessor<S: DocumentStore, B: PatchBroadcast> {
    store: Arc<S>,
    broadcast: Arc<B>,
    locks: CommandLockManager<S>,
    clock: Arc<dyn Clock>,
    dealer: Arc<dyn Dealer>,
    config: CommandConfig,
}

impl<S: DocumentStore, B: PatchBroadcast> CommandProcessor<S, B> {
    pub fn new(
        store: Arc<S>,
        broadcast: Arc<B>,
        clock: Arc<dyn Clock>,
        dealer: Arc<dyn Dealer>,
        config: CommandConfig,
    ) -> Self {
        let locks = CommandLockManager::new(Arc::clone(&store), Arc::clone(&clock), config.clone());
        Self {
            store,
            broadcast,
            locks,
            clock,
            dealer,
            config,
        }
    }

    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    /// The lock manager this processor takes leases from.
    pub fn locks(&self) -> &CommandLockManager<S> {
        &self.locks
    }

    /// Reads the committed room.
    pub async fn room(&self, room_id: &RoomId) -> Result<Room, CommandError> {
        self.store
            .read_room(room_id)
            .await?
            .map(|doc| doc.room)
            .ok_or_else(|| CommandError::RoomNotFound(room_id.clone()))
    }

    // -----------------------------------------------------------------------
    // Room creation
    // -----------------------------------------------------------------------

    /// Creates a room with `creator` seated as its host.
    ///
    /// The room starts in the lobby at `statusVersion` 1, and its first
    /// patch is published with `meta.command = create`.
    pub async fn create_room(
        &self,
        room_id: RoomId,
        creator: PlayerId,
        name: String,
        options: RoomOptions,
    ) -> Result<CommandAck, CommandError> {
        Command::Join {
            name: name.clone(),
            avatar: None,
        }
        .validate()?;
        if options.deal_min > options.deal_max {
            return Err(CommandError::invalid("deal range is empty"));
        }

        let now = self.clock.now_ms();
        let mut room = Room::new(room_id.clone(), creator.clone(), now);
        room.options = options;
        room.host_id = Some(creator.clone());
        room.next_join_order = 1;
        room.status_version = 1;

        let mut doc = RoomDocument::new(room);
        doc.players.insert(
            creator.clone(),
            PlayerRecord {
                id: creator.clone(),
                name,
                avatar: None,
                number: None,
                join_order: 0,
                joined_at: now,
            },
        );
        doc.sync_seats();
        let room = doc.room.clone();

        match self.store.create_room(doc).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => {
                return Err(CommandError::Forbidden {
                    player_id: creator,
                    action: "create a room that already exists",
                });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(%room_id, %creator, "room created");
        self.publish(&room, CommandKind::Create, None, now).await;
        Ok(CommandAck::applied(room.status_version))
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Runs one command on behalf of an authenticated caller.
    ///
    /// # Errors
    /// Any [`CommandError`]. Whatever the error, nothing was written and
    /// the room lock is not left held.
    pub async fn execute(
        &self,
        actor: &PlayerId,
        room_id: &RoomId,
        request_id: &RequestId,
        command: &Command,
    ) -> Result<CommandAck, CommandError> {
        let kind = command.kind();
        let result = self.run(actor, room_id, request_id, command).await;
        match &result {
            Ok(ack) if ack.replayed => {
                tracing::debug!(%room_id, %actor, %request_id, command = %kind, "command replayed");
            }
            Ok(ack) => {
                tracing::info!(
                    %room_id,
                    %actor,
                    command = %kind,
                    status_version = ack.status_version,
                    "command applied"
                );
            }
            Err(e) => {
                tracing::debug!(%room_id, %actor, command = %kind, code = %e.code(), error = %e, "command rejected");
            }
        }
        result
    }

    async fn run(
        &self,
        actor: &PlayerId,
        room_id: &RoomId,
        request_id: &RequestId,
        command: &Command,
    ) -> Result<CommandAck, CommandError> {
        command.validate()?;
        if self.store.read_room(room_id).await?.is_none() {
            return Err(CommandError::RoomNotFound(room_id.clone()));
        }

        let lease = self.locks.acquire_with_retry(room_id).await?;
        let now = self.clock.now_ms();
        let ctx = TransitionContext {
            actor,
            request_id,
            now,
            config: &self.config,
            dealer: self.dealer.as_ref(),
        };
        let result = self
            .store
            .transact_room(room_id, |doc| {
                let transition = transition::apply(doc, command, &ctx)?;
                Ok((transition, doc.room.clone()))
            })
            .await;

        if let Err(e) = lease.release().await {
            tracing::warn!(%room_id, error = %e, "failed to release command lock");
        }

        let (transition, room) = result.map_err(|e| match e {
            TxError::Aborted(e) => e,
            TxError::Store(StoreError::NotFound(id)) => CommandError::RoomNotFound(id),
            TxError::Store(e) => CommandError::Store(e),
        })?;

        match transition {
            Transition::Replayed => Ok(CommandAck::replayed(room.status_version)),
            Transition::Applied { verdict } => {
                self.publish(&room, command.kind(), Some(request_id.clone()), now)
                    .await;
                Ok(CommandAck {
                    verdict,
                    ..CommandAck::applied(room.status_version)
                })
            }
        }
    }

    /// Publishes the room's full projection. A failed publish is logged,
    /// not returned: the mutation is already committed and the next patch
    /// carries the same state.
    async fn publish(
        &self,
        room: &Room,
        command: CommandKind,
        request_id: Option<RequestId>,
        ts: Timestamp,
    ) {
        let patch = SyncPatch::snapshot(
            room,
            PatchMeta {
                source: PatchSource::Api,
                command,
                request_id,
                ts,
            },
        );
        if let Err(e) = self.broadcast.publish(patch).await {
            tracing::warn!(
                room_id = %room.id,
                status_version = room.status_version,
                error = %e,
                "failed to publish patch"
            );
        }
    }
}
