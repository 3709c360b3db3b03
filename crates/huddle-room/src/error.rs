//! Error types for the command path.

use huddle_protocol::{CommandKind, ErrorCode, PlayerId, ProtocolError, RoomId, RoomStatus};
use huddle_store::StoreError;

/// Why a command was not applied.
///
/// Every variant maps to exactly one wire [`ErrorCode`] through
/// [`CommandError::code`]. All of them except `Store` are detected before
/// anything is written.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The caller is authenticated but not allowed to do this.
    #[error("player {player_id} may not {action}")]
    Forbidden {
        player_id: PlayerId,
        action: &'static str,
    },

    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// The command is not valid in the room's current phase.
    #[error("{command} is not allowed while the room is {status}")]
    InvalidStatus {
        command: CommandKind,
        status: RoomStatus,
    },

    #[error("too soon after the previous command, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: i64 },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Not enough seats to open a round.
    #[error("{seated} players seated, {required} required")]
    NoPlayers { seated: usize, required: usize },

    /// The room lock stayed held through every retry.
    #[error("room {0} is busy")]
    Busy(RoomId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CommandError {
    /// The wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::RoomNotFound(_) => ErrorCode::RoomNotFound,
            Self::InvalidStatus { .. } => ErrorCode::InvalidStatus,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::InvalidPayload(_) => ErrorCode::InvalidPayload,
            Self::NoPlayers { .. } => ErrorCode::NoPlayers,
            Self::Busy(_) => ErrorCode::Busy,
            Self::Store(StoreError::NotFound(_)) => ErrorCode::RoomNotFound,
            Self::Store(_) => ErrorCode::InternalError,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidPayload(reason.into())
    }
}

impl From<ProtocolError> for CommandError {
    fn from(e: ProtocolError) -> Self {
        Self::InvalidPayload(e.to_string())
    }
}
