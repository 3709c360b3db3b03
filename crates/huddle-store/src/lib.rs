//! Storage seams for huddle.
//!
//! The engine treats persistence as an external collaborator. This crate
//! names the three services it needs and ships in-memory versions of each:
//!
//! | Seam | Trait | In-memory |
//! |------|-------|-----------|
//! | transactional documents | [`DocumentStore`] | [`MemoryStore`] |
//! | latest-patch broadcast | [`PatchBroadcast`] | [`MemoryBroadcast`] |
//! | heartbeat records | [`PresenceSink`] | [`MemoryPresence`] |
//!
//! Plus a [`Clock`] so every persisted timestamp is server-assigned.

mod broadcast;
mod clock;
mod document;
mod error;
mod memory;
mod presence;

pub use broadcast::{MemoryBroadcast, PatchBroadcast, PatchReceiver};
pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{DocumentStore, LockRecord, RoomDocument};
pub use error::{StoreError, TxError};
pub use memory::{MemoryStore, DEFAULT_MAX_ATTEMPTS};
pub use presence::{MemoryPresence, PresenceSink};
