//! Per-room presence state, threaded from one observation to the next.
//!
//! The aggregator and the stable filter are pure functions; somebody has
//! to own the previous stable list, the `missing_since` map, the
//! quarantine map, and the verification health between calls. That's the
//! tracker. One per room, owned by whoever computes eligibility.

use std::collections::{BTreeMap, BTreeSet};

use huddle_protocol::{PlayerId, PresenceSnapshot, Timestamp};

use crate::aggregator::{aggregate, PresenceSummary, QuarantineMap};
use crate::health::{should_skip_verification, HealthEntry};
use crate::stable::stabilize;
use crate::PresenceConfig;

/// The result of one [`PresenceTracker::observe`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub summary: PresenceSummary,
    /// The smoothed eligibility set.
    pub stable: Vec<PlayerId>,
}

/// Owns a room's presence state between observations.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    config: PresenceConfig,
    stable: Vec<PlayerId>,
    missing_since: BTreeMap<PlayerId, Timestamp>,
    quarantine: QuarantineMap,
    health: HealthEntry,
    last_check_at: Option<Timestamp>,
}

impl PresenceTracker {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            stable: Vec::new(),
            missing_since: BTreeMap::new(),
            quarantine: QuarantineMap::new(),
            health: HealthEntry::default(),
            last_check_at: None,
        }
    }

    /// Runs the aggregator and the stable filter over a fresh snapshot and
    /// remembers the results for the next call.
    pub fn observe(
        &mut self,
        snapshot: &PresenceSnapshot,
        now: Timestamp,
        exclude: &BTreeSet<PlayerId>,
    ) -> Observation {
        let summary = aggregate(snapshot, now, &self.config, &self.quarantine, exclude);
        let next = stabilize(
            &summary.included,
            &self.stable,
            &self.missing_since,
            now,
            self.config.grace_ms,
        );

        if next.stable != self.stable {
            tracing::debug!(
                online = summary.count,
                stable = next.stable.len(),
                has_fresh = summary.has_fresh,
                "stable online set changed"
            );
        }

        self.quarantine = summary.room_quarantine.clone();
        self.stable = next.stable.clone();
        self.missing_since = next.missing_since;

        Observation {
            summary,
            stable: next.stable,
        }
    }

    /// Distrusts stale signals from `player` until `until`.
    ///
    /// Also drops them from the stable set right away, so a kicked or
    /// departed participant doesn't linger for the grace period.
    pub fn quarantine(&mut self, player: PlayerId, until: Timestamp) {
        self.stable.retain(|id| id != &player);
        self.missing_since.remove(&player);
        tracing::debug!(player_id = %player, until, "participant quarantined");
        self.quarantine.insert(player, until);
    }

    /// The last computed stable set.
    pub fn stable(&self) -> &[PlayerId] {
        &self.stable
    }

    /// The current quarantine map.
    pub fn quarantined(&self) -> &QuarantineMap {
        &self.quarantine
    }

    /// Returns `true` if an out-of-band verification may run at `now`.
    ///
    /// Applies idle decay to the stored health first.
    pub fn should_verify(&mut self, now: Timestamp) -> bool {
        self.health = self.health.decayed(now);
        !should_skip_verification(&self.health, self.last_check_at, now)
    }

    /// Claims the verification slot at `now` if [`should_verify`] allows it.
    ///
    /// The claim stamps the last check time before the verification runs,
    /// so a second caller arriving while it is in flight sees the backoff
    /// and stays out. Finish with [`record_verification`].
    ///
    /// [`should_verify`]: Self::should_verify
    /// [`record_verification`]: Self::record_verification
    pub fn begin_verification(&mut self, now: Timestamp) -> bool {
        if !self.should_verify(now) {
            return false;
        }
        self.last_check_at = Some(now);
        true
    }

    /// Records the result of a verification that ran at `now`.
    pub fn record_verification(&mut self, ok: bool, now: Timestamp) {
        if ok {
            self.health.record_success(now);
        } else {
            self.health.record_failure(now);
            tracing::warn!(
                failures = self.health.failures,
                backoff_ms = self.health.backoff_ms,
                "presence verification failed"
            );
        }
        self.last_check_at = Some(now);
    }

    /// The current verification health.
    pub fn health(&self) -> &HealthEntry {
        &self.health
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(PresenceConfig::default())
    }
}
