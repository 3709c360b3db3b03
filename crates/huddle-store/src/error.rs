//! Error types for the storage layer.

use huddle_protocol::RoomId;

/// Errors raised by a document store, broadcast channel, or presence sink.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No document exists for this room.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// A room document with this id already exists.
    #[error("room {0} already exists")]
    AlreadyExists(RoomId),

    /// Optimistic retries were exhausted: every attempt saw another
    /// writer commit between read and write.
    #[error("transaction on room {room_id} conflicted {attempts} times")]
    Conflict { room_id: RoomId, attempts: u32 },

    /// The backing service could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The outcome of a failed read-modify-write transaction.
///
/// `Aborted` carries the caller's own error: the transaction body decided
/// not to commit, and nothing was written.
#[derive(Debug, thiserror::Error)]
pub enum TxError<E> {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("transaction aborted: {0}")]
    Aborted(E),
}
