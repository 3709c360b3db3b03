//! Unified error type for huddle.

use huddle_protocol::{ErrorCode, ProtocolError};
use huddle_room::CommandError;
use huddle_session::SessionError;
use huddle_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `huddle` crate you deal with this single error type
/// instead of importing errors from each layer. Every variant maps to one
/// wire [`ErrorCode`] through [`HuddleError::code`].
#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    /// A request that didn't decode or didn't validate.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or client session failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A command the room refused.
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The engine was built with settings that can't work together.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HuddleError {
    /// The wire code reported to the caller.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol(_) => ErrorCode::InvalidPayload,
            Self::Session(SessionError::AuthFailed(_)) => ErrorCode::Unauthorized,
            Self::Session(_) => ErrorCode::InternalError,
            Self::Command(e) => e.code(),
            Self::Store(StoreError::NotFound(_)) => ErrorCode::RoomNotFound,
            Self::Store(_) | Self::Config(_) => ErrorCode::InternalError,
        }
    }
}
