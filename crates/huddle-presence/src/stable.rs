//! Stable-Online Filter: hysteresis over the aggregator's output.
//!
//! Heartbeats flicker. Without smoothing, a participant whose tab hiccups
//! for a second would vanish from the eligibility set and re-appear,
//! rippling into host election and gameplay. The filter keeps a vanished
//! participant for `grace_ms` after they were first seen missing, then
//! lets the disconnect through for good.

use std::collections::{BTreeMap, HashSet};

use huddle_protocol::{PlayerId, Timestamp};

/// The smoothed eligibility set plus the bookkeeping threaded into the
/// next observation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StableOnline {
    /// Currently-online ids first (given order), then grace-kept ids
    /// (their order from the previous stable list).
    pub stable: Vec<PlayerId>,
    /// When each grace-kept id was first seen missing.
    pub missing_since: BTreeMap<PlayerId, Timestamp>,
}

/// Computes the next stable set.
pub fn stabilize(
    online: &[PlayerId],
    previous_stable: &[PlayerId],
    missing_since: &BTreeMap<PlayerId, Timestamp>,
    now: Timestamp,
    grace_ms: i64,
) -> StableOnline {
    let mut stable = Vec::with_capacity(online.len() + previous_stable.len());
    let mut seen: HashSet<&PlayerId> = HashSet::with_capacity(stable.capacity());
    for id in online {
        if seen.insert(id) {
            stable.push(id.clone());
        }
    }

    let mut next_missing = BTreeMap::new();
    for id in previous_stable {
        if !seen.insert(id) {
            continue;
        }
        let first_missing = missing_since.get(id).copied().unwrap_or(now);
        if now - first_missing < grace_ms {
            stable.push(id.clone());
            next_missing.insert(id.clone(), first_missing);
        } else {
            tracing::debug!(player_id = %id, first_missing, "grace elapsed, dropping from stable set");
        }
    }

    StableOnline {
        stable,
        missing_since: next_missing,
    }
}
