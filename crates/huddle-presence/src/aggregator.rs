//! Presence Aggregator: noisy per-connection heartbeat records in,
//! one "is this participant online" judgment per participant out.
//!
//! A participant is online if at least one of their connections carries a
//! valid signal:
//!
//! ```text
//! online=false                  → never valid
//! online=true, no ts            → valid, treated as "now"
//! ts more than skew in future   → rejected (clock-skewed client)
//! ts older than stale_ms        → rejected (dead connection)
//! otherwise                     → valid
//! ```
//!
//! The latest valid timestamp across connections wins. This never fails:
//! missing or garbage data simply yields fewer online participants.

use std::collections::{BTreeMap, BTreeSet};

use huddle_protocol::{ConnectionMap, PlayerId, PresenceSnapshot, Timestamp};

use crate::PresenceConfig;

/// Participant id → the instant their quarantine ends.
pub type QuarantineMap = BTreeMap<PlayerId, Timestamp>;

/// Extra detail returned when [`PresenceConfig::debug`] is set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresenceDebug {
    /// Every non-excluded participant found in the snapshot.
    pub considered: Vec<PlayerId>,
    /// Latest valid timestamp per participant that had one.
    pub latest: BTreeMap<PlayerId, Timestamp>,
}

/// The aggregator's verdict for one room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresenceSummary {
    /// Number of participants judged online. Always `included.len()`.
    pub count: usize,
    /// At least one included participant has a signal within
    /// `accept_fresh_ms`.
    pub has_fresh: bool,
    /// The quarantine map after this observation: expired entries dropped,
    /// entries cleared by a fresh signal removed.
    pub room_quarantine: QuarantineMap,
    /// Participants judged online, in snapshot (id) order.
    pub included: Vec<PlayerId>,
    pub debug: Option<PresenceDebug>,
}

/// Returns the latest valid timestamp among `connections`, if any.
pub fn latest_valid_signal(
    connections: &ConnectionMap,
    now: Timestamp,
    config: &PresenceConfig,
) -> Option<Timestamp> {
    let mut latest: Option<Timestamp> = None;
    for (conn_id, record) in connections {
        if record.online == Some(false) {
            continue;
        }
        let ts = match record.ts {
            Some(ts) => ts,
            // An online flag without a timestamp was just written by a
            // client whose server stamp hasn't landed yet.
            None if record.online == Some(true) => now,
            None => continue,
        };
        if ts - now > config.max_clock_skew_ms {
            tracing::trace!(%conn_id, ts, now, "rejecting future-skewed heartbeat");
            continue;
        }
        if now - ts > config.stale_ms {
            tracing::trace!(%conn_id, ts, now, "rejecting stale heartbeat");
            continue;
        }
        latest = Some(latest.map_or(ts, |l| l.max(ts)));
    }
    latest
}

/// Judges every participant in `snapshot`.
///
/// `quarantine` holds participants who recently left or were removed: a
/// stale-but-valid signal from them is not trusted. A quarantined
/// participant is only counted once a fresh signal arrives, which also
/// lifts the quarantine. A quarantined participant with no signal at all is
/// simply not online and keeps their quarantine entry.
pub fn aggregate(
    snapshot: &PresenceSnapshot,
    now: Timestamp,
    config: &PresenceConfig,
    quarantine: &QuarantineMap,
    exclude: &BTreeSet<PlayerId>,
) -> PresenceSummary {
    let mut room_quarantine: QuarantineMap = quarantine
        .iter()
        .filter(|(_, until)| **until > now)
        .map(|(id, until)| (id.clone(), *until))
        .collect();

    let mut included = Vec::new();
    let mut has_fresh = false;
    let mut debug = config.debug.then(PresenceDebug::default);

    for (player_id, connections) in snapshot {
        if exclude.contains(player_id) {
            continue;
        }
        if let Some(d) = debug.as_mut() {
            d.considered.push(player_id.clone());
        }

        let Some(latest) = latest_valid_signal(connections, now, config) else {
            continue;
        };
        if let Some(d) = debug.as_mut() {
            d.latest.insert(player_id.clone(), latest);
        }

        let fresh = now - latest <= config.accept_fresh_ms;
        if room_quarantine.contains_key(player_id) {
            if !fresh {
                tracing::trace!(%player_id, latest, "quarantined participant has only a stale signal");
                continue;
            }
            room_quarantine.remove(player_id);
            tracing::debug!(%player_id, "fresh signal lifted quarantine");
        }

        has_fresh |= fresh;
        included.push(player_id.clone());
    }

    PresenceSummary {
        count: included.len(),
        has_fresh,
        room_quarantine,
        included,
        debug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_protocol::{ConnectionId, ConnectionRecord};

    const NOW: Timestamp = 1_000_000;

    fn pid(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    fn conns(records: &[(&str, ConnectionRecord)]) -> ConnectionMap {
        records
            .iter()
            .map(|(id, r)| (ConnectionId::new(*id), *r))
            .collect()
    }

    fn at(ts: Timestamp) -> ConnectionRecord {
        ConnectionRecord::online_at(ts)
    }

    #[test]
    fn test_latest_valid_signal_picks_newest_connection() {
        let config = PresenceConfig::default();
        let c = conns(&[("tab1", at(NOW - 9_000)), ("tab2", at(NOW - 2_000))]);
        assert_eq!(latest_valid_signal(&c, NOW, &config), Some(NOW - 2_000));
    }

    #[test]
    fn test_latest_valid_signal_online_without_ts_is_now() {
        let config = PresenceConfig::default();
        let record = ConnectionRecord {
            online: Some(true),
            ts: None,
            offline_at: None,
        };
        let c = conns(&[("tab", record)]);
        assert_eq!(latest_valid_signal(&c, NOW, &config), Some(NOW));
    }

    #[test]
    fn test_latest_valid_signal_ignores_offline_record() {
        let config = PresenceConfig::default();
        let c = conns(&[("tab", ConnectionRecord::offline_at(NOW))]);
        assert_eq!(latest_valid_signal(&c, NOW, &config), None);
    }

    #[test]
    fn test_latest_valid_signal_bare_record_is_invalid() {
        let config = PresenceConfig::default();
        let c = conns(&[("tab", ConnectionRecord::default())]);
        assert_eq!(latest_valid_signal(&c, NOW, &config), None);
    }

    #[test]
    fn test_aggregate_empty_snapshot_counts_zero() {
        let summary = aggregate(
            &PresenceSnapshot::new(),
            NOW,
            &PresenceConfig::default(),
            &QuarantineMap::new(),
            &BTreeSet::new(),
        );
        assert_eq!(summary.count, 0);
        assert!(!summary.has_fresh);
        assert!(summary.debug.is_none());
    }

    #[test]
    fn test_aggregate_excluded_participant_not_considered() {
        let mut snapshot = PresenceSnapshot::new();
        snapshot.insert(pid("a"), conns(&[("t", at(NOW))]));
        snapshot.insert(pid("b"), conns(&[("t", at(NOW))]));
        let exclude = BTreeSet::from([pid("b")]);
        let config = PresenceConfig {
            debug: true,
            ..PresenceConfig::default()
        };

        let summary = aggregate(&snapshot, NOW, &config, &QuarantineMap::new(), &exclude);

        assert_eq!(summary.included, vec![pid("a")]);
        assert_eq!(summary.debug.unwrap().considered, vec![pid("a")]);
    }

    #[test]
    fn test_aggregate_has_fresh_only_within_accept_window() {
        let config = PresenceConfig::default();
        let mut snapshot = PresenceSnapshot::new();
        snapshot.insert(pid("a"), conns(&[("t", at(NOW - 30_000))]));

        let summary = aggregate(&snapshot, NOW, &config, &QuarantineMap::new(), &BTreeSet::new());

        assert_eq!(summary.count, 1, "30s old is stale-but-valid");
        assert!(!summary.has_fresh);
    }

    #[test]
    fn test_aggregate_expired_quarantine_is_dropped() {
        let quarantine = QuarantineMap::from([(pid("a"), NOW - 1)]);
        let summary = aggregate(
            &PresenceSnapshot::new(),
            NOW,
            &PresenceConfig::default(),
            &quarantine,
            &BTreeSet::new(),
        );
        assert!(summary.room_quarantine.is_empty());
    }
}
