//! Host resolution.
//!
//! Every client, and the server when the host leaves, runs the same
//! deterministic pick over the same inputs, so independently computing
//! parties agree on one host without talking to each other.

use std::collections::BTreeSet;

use huddle_protocol::{PlayerId, Seat, Timestamp};

/// One roster member as the resolver sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: PlayerId,
    pub join_order: u64,
    /// Last time presence saw this player, if ever.
    pub last_seen_at: Option<Timestamp>,
}

impl From<&Seat> for RosterEntry {
    fn from(seat: &Seat) -> Self {
        Self {
            id: seat.id.clone(),
            join_order: seat.join_order,
            last_seen_at: None,
        }
    }
}

/// Picks the room's host.
///
/// `online` is `None` while presence hasn't produced its first reading.
///
/// The previous host stays if they are still on the roster and presence
/// isn't ready yet, or they are online, or they were seen within
/// `grace_ms`. Otherwise the pick is the online player with the earliest
/// join order (any player, if nobody is online), ties broken by id.
///
/// ```
/// use std::collections::BTreeSet;
/// use huddle_protocol::PlayerId;
/// use huddle_session::{resolve_host, RosterEntry};
///
/// let roster = vec![
///     RosterEntry { id: PlayerId::new("a"), join_order: 0, last_seen_at: None },
///     RosterEntry { id: PlayerId::new("b"), join_order: 1, last_seen_at: None },
/// ];
/// let online = BTreeSet::from([PlayerId::new("b")]);
///
/// let host = resolve_host(&roster, Some(&PlayerId::new("a")), Some(&online), 0, 0);
/// assert_eq!(host, Some(PlayerId::new("b")));
/// ```
pub fn resolve_host(
    roster: &[RosterEntry],
    previous: Option<&PlayerId>,
    online: Option<&BTreeSet<PlayerId>>,
    now: Timestamp,
    grace_ms: i64,
) -> Option<PlayerId> {
    let is_online = |id: &PlayerId| online.is_some_and(|set| set.contains(id));

    if let Some(entry) = previous.and_then(|prev| roster.iter().find(|e| &e.id == prev)) {
        let recently_seen = entry
            .last_seen_at
            .is_some_and(|seen| now - seen <= grace_ms);
        if online.is_none() || is_online(&entry.id) || recently_seen {
            return Some(entry.id.clone());
        }
    }

    roster
        .iter()
        .min_by(|a, b| {
            // Online first, then join order, then id.
            is_online(&b.id)
                .cmp(&is_online(&a.id))
                .then(a.join_order.cmp(&b.join_order))
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|e| e.id.clone())
}
