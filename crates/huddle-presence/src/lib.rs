//! Presence judgment for huddle.
//!
//! Turns raw heartbeat records into the set of participants the rest of
//! the engine should treat as present:
//!
//! ```text
//! PresenceSnapshot ─→ aggregate() ─→ online ids ─→ stabilize() ─→ stable set
//!                        ↑                             ↑
//!                   quarantine                   missing_since
//! ```
//!
//! - [`aggregate`]: Presence Aggregator (clock skew, staleness, quarantine)
//! - [`stabilize`]: Stable-Online Filter (grace-period hysteresis)
//! - [`HealthEntry`]: Verification Health Tracker (backoff + breaker)
//! - [`PresenceTracker`]: owns all of the above for one room
//!
//! Everything here is synchronous and clock-free: callers pass `now`.

mod aggregator;
mod config;
mod health;
mod stable;
mod tracker;

pub use aggregator::{aggregate, latest_valid_signal, PresenceDebug, PresenceSummary, QuarantineMap};
pub use config::PresenceConfig;
pub use health::{
    should_skip_verification, HealthEntry, DECAY_WINDOW_MS, MAX_BACKOFF_MS, MIN_BACKOFF_MS,
};
pub use stable::{stabilize, StableOnline};
pub use tracker::{Observation, PresenceTracker};
