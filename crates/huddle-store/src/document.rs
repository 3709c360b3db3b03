//! The document store seam.
//!
//! huddle doesn't ship a database. It defines the [`DocumentStore`] trait
//! with exactly the guarantees the command path needs:
//!
//! - strongly consistent read-modify-write transactions scoped to one
//!   room document plus its player sub-documents ([`transact_room`]),
//! - the same for the room's lock record ([`transact_lock`]),
//! - transparent optimistic retry; a conflict only surfaces once retries
//!   are exhausted.
//!
//! Transaction bodies are plain closures over a draft. They may run more
//! than once, so they must not have side effects beyond the draft.
//!
//! [`transact_room`]: DocumentStore::transact_room
//! [`transact_lock`]: DocumentStore::transact_lock

use std::collections::BTreeMap;
use std::future::Future;

use huddle_protocol::{PlayerId, PlayerRecord, Room, RoomId, Timestamp};

use crate::{StoreError, TxError};

/// A room (`rooms/{roomId}`) together with its player sub-documents
/// (`rooms/{roomId}/players/{participantId}`). The unit of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomDocument {
    pub room: Room,
    pub players: BTreeMap<PlayerId, PlayerRecord>,
}

impl RoomDocument {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            players: BTreeMap::new(),
        }
    }

    /// Rebuilds the room's public `seats` from the player sub-documents,
    /// ordered by join order.
    pub fn sync_seats(&mut self) {
        let mut seats: Vec<_> = self.players.values().map(PlayerRecord::seat).collect();
        seats.sort_by(|a, b| a.join_order.cmp(&b.join_order).then_with(|| a.id.cmp(&b.id)));
        self.room.seats = seats;
    }
}

/// A room's command lock (`roomCommandLocks/{roomId}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub locked: bool,
    /// The lease token of whoever holds (or last held) the lock.
    pub holder: String,
    pub updated_at: Timestamp,
}

/// A transactional document store.
///
/// ## Trait bounds explained
///
/// - `Send + Sync` → one store is shared by every request handler, and
///   Tokio may poll those handlers on any worker thread.
/// - `'static` → the store lives as long as the engine that owns it, so
///   it can't borrow anything shorter-lived.
///
/// ## Why `impl Future + Send` instead of `async fn`?
///
/// An `async fn` in a trait doesn't promise that the future it returns is
/// `Send`. The processor awaits these futures inside spawned tasks, which
/// need `Send`. Spelling the return type out as
/// `impl Future<Output = ...> + Send` makes that promise part of the
/// trait. Implementors can still write plain `async fn`; the compiler
/// checks the future they produce against the bound.
pub trait DocumentStore: Send + Sync + 'static {
    /// Writes a brand-new room document.
    ///
    /// # Errors
    /// [`StoreError::AlreadyExists`] if the id is taken.
    fn create_room(
        &self,
        doc: RoomDocument,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads the committed state of a room.
    fn read_room(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<Option<RoomDocument>, StoreError>> + Send;

    /// Runs `f` against a draft of the room document and commits the draft
    /// if `f` returns `Ok`. If `f` returns `Err`, nothing is written and the
    /// error comes back as [`TxError::Aborted`].
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the room doesn't exist,
    /// [`StoreError::Conflict`] when optimistic retries run out.
    fn transact_room<T, E, F>(
        &self,
        room_id: &RoomId,
        f: F,
    ) -> impl Future<Output = Result<T, TxError<E>>> + Send
    where
        T: Send,
        E: Send,
        F: FnMut(&mut RoomDocument) -> Result<T, E> + Send;

    /// Runs `f` against the room's lock record (absent = `None`) and
    /// commits whatever `f` leaves in it.
    fn transact_lock<T, F>(
        &self,
        room_id: &RoomId,
        f: F,
    ) -> impl Future<Output = Result<T, StoreError>> + Send
    where
        T: Send,
        F: FnMut(&mut Option<LockRecord>) -> T + Send;
}
