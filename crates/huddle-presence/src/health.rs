//! Verification Health Tracker: adaptive backoff and circuit breaker for
//! expensive out-of-band presence re-checks.
//!
//! Each success heals the room's health and shortens the backoff; each
//! failure damages it and doubles the backoff. At zero health the breaker
//! is open and verification is skipped entirely. Idle time heals too, so a
//! room never stays locked out just because nobody got to run a check.

use huddle_protocol::Timestamp;
use serde::{Deserialize, Serialize};

/// Shortest wait between verifications.
pub const MIN_BACKOFF_MS: i64 = 10_000;
/// Longest wait between verifications.
pub const MAX_BACKOFF_MS: i64 = 300_000;
/// Idle period after which health starts recovering on its own.
pub const DECAY_WINDOW_MS: i64 = 300_000;

const SUCCESS_GAIN: f64 = 0.25;
const FAILURE_PENALTY: f64 = 0.5;
const DECAY_GAIN: f64 = 0.25;
// More idle windows than this recover no further.
const MAX_DECAY_WINDOWS: i64 = 4;

/// Per-room verification health.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthEntry {
    pub backoff_ms: i64,
    pub failures: u32,
    /// In `[0, 1]`. Zero means the breaker is open.
    pub health_score: f64,
    pub last_verified_at: Option<Timestamp>,
}

impl Default for HealthEntry {
    fn default() -> Self {
        Self {
            backoff_ms: MIN_BACKOFF_MS,
            failures: 0,
            health_score: 1.0,
            last_verified_at: None,
        }
    }
}

impl HealthEntry {
    /// Folds in a successful verification.
    pub fn record_success(&mut self, now: Timestamp) {
        self.health_score = (self.health_score + SUCCESS_GAIN).min(1.0);
        self.failures = 0;
        self.backoff_ms = (self.backoff_ms / 2).max(MIN_BACKOFF_MS);
        self.last_verified_at = Some(now);
    }

    /// Folds in a failed verification.
    pub fn record_failure(&mut self, now: Timestamp) {
        self.failures += 1;
        self.health_score = (self.health_score - FAILURE_PENALTY).max(0.0);
        self.backoff_ms = self
            .backoff_ms
            .saturating_mul(2)
            .clamp(MIN_BACKOFF_MS, MAX_BACKOFF_MS);
        self.last_verified_at = Some(now);
    }

    /// Returns the entry as it should be seen at `now`, after idle decay.
    ///
    /// Every whole [`DECAY_WINDOW_MS`] since the last verification (up to
    /// four) restores some health and halves the backoff. The consumed
    /// windows are added to `last_verified_at`, so reading twice at the same
    /// instant decays only once.
    pub fn decayed(&self, now: Timestamp) -> Self {
        let mut next = *self;
        let Some(last) = self.last_verified_at else {
            return next;
        };
        let windows = (now - last) / DECAY_WINDOW_MS;
        if windows < 1 {
            return next;
        }
        for _ in 0..windows.min(MAX_DECAY_WINDOWS) {
            next.health_score = (next.health_score + DECAY_GAIN).min(1.0);
            next.backoff_ms = (next.backoff_ms / 2).max(MIN_BACKOFF_MS);
        }
        next.last_verified_at = Some(last + windows * DECAY_WINDOW_MS);
        tracing::debug!(
            windows,
            health = next.health_score,
            backoff_ms = next.backoff_ms,
            "verification health decayed toward healthy"
        );
        next
    }

    /// Returns `true` when the breaker is open.
    pub fn is_tripped(&self) -> bool {
        self.health_score <= 0.0
    }
}

/// Returns `true` if a verification should NOT run now: either the last
/// check was within the backoff, or the breaker is open.
pub fn should_skip_verification(
    entry: &HealthEntry,
    last_check_at: Option<Timestamp>,
    now: Timestamp,
) -> bool {
    let within_backoff = last_check_at.is_some_and(|last| now - last < entry.backoff_ms);
    within_backoff || entry.is_tripped()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_entry_is_healthy() {
        let entry = HealthEntry::default();
        assert_eq!(entry.health_score, 1.0);
        assert_eq!(entry.backoff_ms, MIN_BACKOFF_MS);
        assert!(!should_skip_verification(&entry, None, 0));
    }

    #[test]
    fn test_record_failure_doubles_backoff_and_damages_health() {
        let mut entry = HealthEntry::default();
        entry.record_failure(1_000);
        assert_eq!(entry.failures, 1);
        assert_eq!(entry.health_score, 0.5);
        assert_eq!(entry.backoff_ms, 20_000);

        entry.record_failure(2_000);
        assert_eq!(entry.health_score, 0.0);
        assert!(entry.is_tripped());
    }

    #[test]
    fn test_record_failure_caps_backoff() {
        let mut entry = HealthEntry {
            backoff_ms: 200_000,
            ..HealthEntry::default()
        };
        entry.record_failure(0);
        assert_eq!(entry.backoff_ms, MAX_BACKOFF_MS);
    }

    #[test]
    fn test_record_success_heals_and_halves_backoff() {
        let mut entry = HealthEntry {
            backoff_ms: 80_000,
            failures: 3,
            health_score: 0.5,
            last_verified_at: None,
        };
        entry.record_success(5);
        assert_eq!(entry.failures, 0);
        assert_eq!(entry.health_score, 0.75);
        assert_eq!(entry.backoff_ms, 40_000);
        assert_eq!(entry.last_verified_at, Some(5));
    }

    #[test]
    fn test_record_success_backoff_floor() {
        let mut entry = HealthEntry::default();
        entry.record_success(0);
        assert_eq!(entry.backoff_ms, MIN_BACKOFF_MS);
        assert_eq!(entry.health_score, 1.0);
    }

    #[test]
    fn test_should_skip_within_backoff() {
        let entry = HealthEntry::default();
        assert!(should_skip_verification(&entry, Some(0), MIN_BACKOFF_MS - 1));
        assert!(!should_skip_verification(&entry, Some(0), MIN_BACKOFF_MS));
    }

    #[test]
    fn test_should_skip_when_tripped() {
        let entry = HealthEntry {
            health_score: 0.0,
            ..HealthEntry::default()
        };
        assert!(should_skip_verification(&entry, None, 1_000_000));
    }

    #[test]
    fn test_decayed_recovers_tripped_entry() {
        let entry = HealthEntry {
            backoff_ms: 160_000,
            failures: 4,
            health_score: 0.0,
            last_verified_at: Some(0),
        };
        let healed = entry.decayed(DECAY_WINDOW_MS);
        assert_eq!(healed.health_score, 0.25);
        assert_eq!(healed.backoff_ms, 80_000);
        assert!(!healed.is_tripped());

        // Reading again at the same instant doesn't decay twice.
        let again = healed.decayed(DECAY_WINDOW_MS);
        assert_eq!(again, healed);
    }

    #[test]
    fn test_decayed_before_window_is_unchanged() {
        let entry = HealthEntry {
            health_score: 0.5,
            last_verified_at: Some(0),
            ..HealthEntry::default()
        };
        assert_eq!(entry.decayed(DECAY_WINDOW_MS - 1), entry);
    }
}
