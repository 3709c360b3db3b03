//! Error types for the session layer.

use huddle_protocol::RoomId;
use huddle_store::StoreError;

/// Why a patch was not applied to the local room.
///
/// None of these are failures from the client's point of view: stale and
/// duplicate patches are expected on a channel without ordering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchRejection {
    /// There is no local room to apply to yet.
    #[error("no local room")]
    NoRoom,

    #[error("patch for room {got} applied to room {expected}")]
    RoomMismatch { expected: RoomId, got: RoomId },

    /// Older than what is already held.
    #[error("stale patch v{incoming}, holding v{local}")]
    Stale { local: u64, incoming: u64 },

    /// Same version as what is already held.
    #[error("duplicate patch v{version}")]
    Duplicate { version: u64 },
}

/// Errors that can occur in a client session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was unknown, expired, or rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error(transparent)]
    Patch(#[from] PatchRejection),

    /// A background task ended abnormally.
    #[error("session task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
