//! Room data model and wire protocol for huddle.
//!
//! This crate defines the "language" the backend and its clients share:
//!
//! - **Room model** ([`Room`], [`OrderState`], [`Seat`], [`PlayerRecord`]):
//!   the authoritative document and its participants.
//! - **Sync patches** ([`SyncPatch`], [`RoomPatch`]): versioned updates
//!   pushed to clients after every accepted mutation.
//! - **Commands** ([`Command`], [`CommandRequest`], [`CommandResponse`],
//!   [`ErrorCode`]): the request/response surface.
//! - **Presence records** ([`ConnectionRecord`], [`PresenceSnapshot`]).
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]).
//!
//! It knows nothing about stores, locks, or clocks; it only describes data.

mod codec;
mod command;
mod error;
mod patch;
mod presence;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use command::{
    Command, CommandAck, CommandFailure, CommandKind, CommandRequest, CommandResponse,
    CreateRoomRequest, ErrorCode, HeartbeatRequest, RoundVerdict, MAX_AVATAR_LEN, MAX_NAME_LEN,
    MAX_TOPIC_LEN,
};
pub use error::ProtocolError;
pub use patch::{PatchMeta, PatchSource, RoomPatch, SyncPatch, UiPatch};
pub use presence::{ConnectionId, ConnectionMap, ConnectionRecord, PresenceSnapshot, PresenceWrite};
pub use types::{
    OrderState, PlayerId, PlayerRecord, RequestId, ResolveMode, Room, RoomId, RoomOptions,
    RoomStatus, RoundStats, Seat, Timestamp, UiFlags,
};
