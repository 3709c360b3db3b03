//! The client side of huddle, plus caller identity.
//!
//! This crate handles what a participant's client keeps running while it
//! is in a room:
//!
//! 1. **Authentication**: resolving who a caller is ([`Authenticator`])
//! 2. **Reconciliation**: folding versioned patches into a local copy of
//!    the room ([`apply_patch`], [`RoomCache`])
//! 3. **Host resolution**: agreeing on a host without coordination
//!    ([`resolve_host`])
//! 4. **Session lifecycle**: heartbeat and patch-follower tasks owned by a
//!    [`ClientSession`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)     ← uses resolve_host when a host leaves
//!     ↕
//! Session Layer (this)   ← identity, client cache, background tasks
//!     ↕
//! Store + Protocol (below)
//! ```

mod auth;
mod cache;
mod error;
mod host;
mod reconcile;
mod session;

pub use auth::{Authenticator, TokenTable};
pub use cache::{CacheStats, RoomCache};
pub use error::{PatchRejection, SessionError};
pub use host::{resolve_host, RosterEntry};
pub use reconcile::apply_patch;
pub use session::{ClientSession, SessionConfig};
