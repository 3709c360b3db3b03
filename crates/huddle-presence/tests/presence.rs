//! Integration tests for presence judgment: aggregator, stable filter, and
//! the per-room tracker working together.

use std::collections::BTreeSet;

use huddle_presence::{
    aggregate, PresenceConfig, PresenceTracker, QuarantineMap, DECAY_WINDOW_MS, MIN_BACKOFF_MS,
};
use huddle_protocol::{ConnectionId, ConnectionMap, ConnectionRecord, PlayerId, PresenceSnapshot, Timestamp};

// =========================================================================
// Helpers
// =========================================================================

const NOW: Timestamp = 10_000_000;

fn pid(id: &str) -> PlayerId {
    PlayerId::new(id)
}

fn one_tab(ts: Timestamp) -> ConnectionMap {
    ConnectionMap::from([(ConnectionId::new("tab"), ConnectionRecord::online_at(ts))])
}

fn snapshot(entries: &[(&str, Timestamp)]) -> PresenceSnapshot {
    entries
        .iter()
        .map(|(id, ts)| (pid(id), one_tab(*ts)))
        .collect()
}

fn no_exclusions() -> BTreeSet<PlayerId> {
    BTreeSet::new()
}

// =========================================================================
// Aggregator
// =========================================================================

#[test]
fn test_aggregate_rejects_future_skewed_signal() {
    let config = PresenceConfig {
        max_clock_skew_ms: 10_000,
        ..PresenceConfig::default()
    };
    let snap = snapshot(&[("skewed", NOW + 20_000), ("ok", NOW)]);

    let summary = aggregate(&snap, NOW, &config, &QuarantineMap::new(), &no_exclusions());

    assert_eq!(summary.count, 1);
    assert_eq!(summary.included, vec![pid("ok")]);
}

#[test]
fn test_aggregate_rejects_stale_signal() {
    let config = PresenceConfig::default();
    let snap = snapshot(&[("gone", NOW - config.stale_ms - 1)]);

    let summary = aggregate(&snap, NOW, &config, &QuarantineMap::new(), &no_exclusions());

    assert_eq!(summary.count, 0);
}

#[test]
fn test_aggregate_multi_tab_any_valid_connection_counts() {
    let config = PresenceConfig::default();
    let mut snap = PresenceSnapshot::new();
    snap.insert(
        pid("a"),
        ConnectionMap::from([
            (ConnectionId::new("old"), ConnectionRecord::offline_at(NOW - 1_000)),
            (ConnectionId::new("new"), ConnectionRecord::online_at(NOW - 500)),
        ]),
    );

    let summary = aggregate(&snap, NOW, &config, &QuarantineMap::new(), &no_exclusions());

    assert_eq!(summary.count, 1);
    assert!(summary.has_fresh);
}

#[test]
fn test_aggregate_quarantine_hides_stale_signal() {
    let config = PresenceConfig::default();
    // Valid (not stale) but older than accept_fresh_ms.
    let ts = NOW - config.accept_fresh_ms - 1;
    let snap = snapshot(&[("a", ts)]);
    let quarantine = QuarantineMap::from([(pid("a"), NOW + 60_000)]);

    let summary = aggregate(&snap, NOW, &config, &quarantine, &no_exclusions());

    assert_eq!(summary.count, 0);
    assert!(summary.room_quarantine.contains_key(&pid("a")));
}

#[test]
fn test_aggregate_fresh_signal_clears_quarantine() {
    let config = PresenceConfig::default();
    let snap = snapshot(&[("a", NOW - 100)]);
    let quarantine = QuarantineMap::from([(pid("a"), NOW + 60_000)]);

    let summary = aggregate(&snap, NOW, &config, &quarantine, &no_exclusions());

    assert_eq!(summary.count, 1);
    assert!(summary.room_quarantine.is_empty());
}

#[test]
fn test_aggregate_absent_participant_keeps_quarantine() {
    let config = PresenceConfig::default();
    let quarantine = QuarantineMap::from([(pid("a"), NOW + 60_000)]);

    let summary = aggregate(&PresenceSnapshot::new(), NOW, &config, &quarantine, &no_exclusions());

    assert_eq!(summary.count, 0);
    assert_eq!(summary.room_quarantine.get(&pid("a")), Some(&(NOW + 60_000)));
}

// =========================================================================
// Tracker
// =========================================================================

#[test]
fn test_tracker_absorbs_flicker_then_drops() {
    let mut tracker = PresenceTracker::new(PresenceConfig {
        grace_ms: 5_000,
        ..PresenceConfig::default()
    });

    let all = snapshot(&[("a", NOW), ("b", NOW), ("c", NOW)]);
    let obs = tracker.observe(&all, NOW, &no_exclusions());
    assert_eq!(obs.stable, vec![pid("a"), pid("b"), pid("c")]);

    // c's record goes stale: only a and b are online from here on.
    let later = NOW + 50_000;
    let partial = snapshot(&[("a", later), ("b", later)]);

    let obs = tracker.observe(&partial, later, &no_exclusions());
    assert_eq!(obs.stable, vec![pid("a"), pid("b"), pid("c")], "c within grace");

    let obs = tracker.observe(&partial, later + 4_999, &no_exclusions());
    assert!(obs.stable.contains(&pid("c")));

    let obs = tracker.observe(&partial, later + 5_001, &no_exclusions());
    assert_eq!(obs.stable, vec![pid("a"), pid("b")]);
}

#[test]
fn test_tracker_quarantine_removes_from_stable_immediately() {
    let mut tracker = PresenceTracker::default();
    tracker.observe(&snapshot(&[("a", NOW), ("b", NOW)]), NOW, &no_exclusions());

    tracker.quarantine(pid("b"), NOW + 30_000);

    assert_eq!(tracker.stable(), &[pid("a")]);
    assert!(tracker.quarantined().contains_key(&pid("b")));
}

#[test]
fn test_tracker_verification_backoff_cycle() {
    let mut tracker = PresenceTracker::default();
    assert!(tracker.should_verify(NOW));

    tracker.record_verification(false, NOW);
    // Backoff doubled to 20s after one failure.
    assert!(!tracker.should_verify(NOW + MIN_BACKOFF_MS));
    assert!(tracker.should_verify(NOW + 2 * MIN_BACKOFF_MS));

    tracker.record_verification(false, NOW + 2 * MIN_BACKOFF_MS);
    assert!(tracker.health().is_tripped());
    assert!(!tracker.should_verify(NOW + 200_000));

    // Idle long enough and the breaker closes on its own.
    assert!(tracker.should_verify(NOW + 2 * MIN_BACKOFF_MS + DECAY_WINDOW_MS));
}

#[test]
fn test_tracker_begin_verification_claims_slot() {
    let mut tracker = PresenceTracker::default();

    assert!(tracker.begin_verification(NOW));
    // The first check has not reported back yet.
    assert!(!tracker.begin_verification(NOW));
    assert!(!tracker.begin_verification(NOW + 1));

    tracker.record_verification(true, NOW + 1);
    assert!(tracker.begin_verification(NOW + 1 + MIN_BACKOFF_MS));
}
