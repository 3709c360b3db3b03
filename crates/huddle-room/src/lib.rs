//! The authoritative mutation path for huddle rooms.
//!
//! Every state change to a room goes through here:
//!
//! - [`CommandLockManager`]: per-room mutual exclusion with lease expiry
//! - [`CommandProcessor`]: validates, locks, transacts, publishes
//! - [`transition`]: what each command does to the document
//! - [`evaluate_sorted`] and friends: pure round verdicts and statistics
//! - [`Dealer`]: hands out the hidden numbers
//!
//! # Guarantees
//!
//! - `statusVersion` moves by exactly one per applied command.
//! - A command retried with the same request id after it took effect is
//!   acknowledged again without a second mutation.
//! - A rejected command writes nothing, and the room lock is always given
//!   back (explicitly, by a drop guard, or by lease expiry).

mod config;
mod dealer;
mod error;
mod lock;
mod outcome;
mod processor;
pub mod transition;

pub use config::CommandConfig;
pub use dealer::{Dealer, RandomDealer, SequenceDealer};
pub use error::CommandError;
pub use lock::{CommandLockManager, Lease};
pub use outcome::{
    build_play_outcome_payload, build_reveal_outcome_payload, evaluate_sorted, HiddenValues,
    PlayOutcome, RevealOutcome, SortEvaluation,
};
pub use processor::CommandProcessor;
pub use transition::Transition;
