//! # huddle
//!
//! Server-authoritative coordination for small multiplayer rooms.
//!
//! Clients send commands; the [`Engine`] authenticates them, serializes them
//! per room with a leased lock, applies them in a store transaction exactly
//! once per request id, and broadcasts a versioned sync patch. Heartbeats
//! feed a presence pipeline that decides who is really in the room.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use huddle::prelude::*;
//!
//! # async fn run() -> Result<(), HuddleError> {
//! let auth = TokenTable::new();
//! auth.insert("tok-host", PlayerId::new("host")).await;
//!
//! let engine = Engine::builder().build(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryBroadcast::new()),
//!     Arc::new(MemoryPresence::new()),
//!     auth,
//! )?;
//!
//! engine
//!     .create_room(CreateRoomRequest {
//!         room_id: RoomId::new("r1"),
//!         token: "tok-host".into(),
//!         name: "Host".into(),
//!         options: RoomOptions::default(),
//!     })
//!     .await?;
//! let reply = engine.handle_json(br#"{"roomId":"r1","token":"tok-host",
//!     "requestId":"q1","command":"topic_change","topic":"fruit"}"#).await;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;

pub use engine::{Engine, EngineBuilder, PresenceProbe};
pub use error::HuddleError;

/// Re-exports for the common case.
pub mod prelude {
    pub use crate::{Engine, EngineBuilder, HuddleError, PresenceProbe};
    pub use huddle_presence::{Observation, PresenceConfig};
    pub use huddle_protocol::{
        Command, CommandAck, CommandRequest, CommandResponse, ConnectionId, CreateRoomRequest,
        ErrorCode, HeartbeatRequest, PlayerId, RequestId, ResolveMode, Room, RoomId, RoomOptions,
        RoomStatus, RoundStats, SyncPatch,
    };
    pub use huddle_room::{CommandConfig, Dealer, RandomDealer, SequenceDealer};
    pub use huddle_session::{
        apply_patch, Authenticator, ClientSession, RoomCache, SessionConfig, SessionError,
        TokenTable,
    };
    pub use huddle_store::{
        Clock, DocumentStore, ManualClock, MemoryBroadcast, MemoryPresence, MemoryStore,
        PatchBroadcast, PresenceSink, StoreError, SystemClock,
    };
}
