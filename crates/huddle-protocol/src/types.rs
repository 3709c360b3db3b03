//! Core data model for huddle rooms.
//!
//! These are the structures the backend persists (the room document and
//! its player sub-documents) and the read-only copies clients cache.
//! Every type here is serializable because it either lives in the
//! document store or travels inside a [`SyncPatch`](crate::SyncPatch).
//!
//! Field names are camelCase on the wire (`statusVersion`, `failedAt`, ...)
//! so browser clients can consume them without a mapping layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch.
///
/// Signed on purpose: presence math subtracts timestamps in both
/// directions (`ts - now` for clock skew, `now - ts` for staleness).
pub type Timestamp = i64;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable identifier for a participant (a seat-holder in a room).
///
/// Newtype over `String` so a `PlayerId` can't be passed where a
/// `RoomId` is expected. `Ord` is derived because the Host Resolver uses
/// the id as the final deterministic tie-breaker.
///
/// `#[serde(transparent)]` serializes `PlayerId("u1")` as just `"u1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Creates a player id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unique identifier for a room (one long-lived game session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Creates a room id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A client-supplied idempotency key.
///
/// A client that retries a command after a dropped response reuses the
/// same `RequestId`, which lets the processor recognise the retry and
/// answer without mutating the room a second time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Creates a request id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RoomStatus: the phase state machine
// ---------------------------------------------------------------------------

/// The phase a room is in.
///
/// ```text
/// waiting ──start──→ clue ──submit/commit──→ reveal ──finalize──→ finished
///    ↑                 ↑                        │                     │
///    │                 └──────next_round────────┴─────────────────────┘
///    └──────────────── reset (from any phase) ──────────────────────────
/// ```
///
/// The room never reaches a terminal state: `finished` only ends the
/// current round, and the room cycles indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Lobby: players gather, no round in progress.
    #[default]
    Waiting,
    /// A round is running: numbers are dealt, players exchange clues.
    Clue,
    /// The final order is known and being revealed.
    Reveal,
    /// The round is over.
    Finished,
}

impl RoomStatus {
    /// Returns `true` while a round is being played (numbers in hand).
    pub fn is_round_active(self) -> bool {
        matches!(self, Self::Clue)
    }

    /// Returns `true` if a round outcome is on the table.
    pub fn is_round_over(self) -> bool {
        matches!(self, Self::Reveal | Self::Finished)
    }

    /// Returns `true` if moving from `self` to `target` is a legal phase edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        // Reset may land in the lobby from anywhere, and next_round may
        // open a new round from anywhere.
        matches!(
            (self, target),
            (_, Self::Waiting)
                | (_, Self::Clue)
                | (Self::Clue, Self::Reveal)
                | (Self::Reveal, Self::Finished)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Clue => write!(f, "clue"),
            Self::Reveal => write!(f, "reveal"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

// ---------------------------------------------------------------------------
// Round state
// ---------------------------------------------------------------------------

/// The ordering players build during a round.
///
/// Created at round start, appended to by `submit_order`/`commit_play`,
/// and frozen once the verdict is in (`failed` or the list is complete).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderState {
    /// Participant ids in play order. Append-only during a round.
    pub list: Vec<PlayerId>,
    /// Most recently accepted hidden value.
    pub last_number: Option<u32>,
    /// Whether an ordering violation has been seen.
    pub failed: bool,
    /// 1-based position of the first violation. Always `<= list.len()`.
    pub failed_at: Option<usize>,
    /// Expected final length of `list`.
    pub total: usize,
    /// When the round's verdict was decided.
    pub decided_at: Option<Timestamp>,
}

impl OrderState {
    /// A fresh, empty order expecting `total` plays.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Returns `true` once every expected play has been made.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.list.len() >= self.total
    }

    /// Returns `true` if `player` has already been placed in the order.
    pub fn contains(&self, player: &PlayerId) -> bool {
        self.list.contains(player)
    }
}

/// Transient UI hints shared by every client in the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiFlags {
    /// A round was opened but numbers have not been dealt yet.
    pub round_preparing: bool,
    /// Players may still look at their own number.
    pub recall_open: bool,
    /// The verdict is known and the reveal sequence is playing.
    pub reveal_pending: bool,
}

/// Running statistics across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStats {
    pub game_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub current_streak: u32,
    pub best_streak: u32,
}

impl RoundStats {
    /// Folds one round outcome into the running totals.
    pub fn record(&mut self, success: bool) {
        self.game_count += 1;
        if success {
            self.success_count += 1;
            self.current_streak += 1;
        } else {
            self.failure_count += 1;
            self.current_streak = 0;
        }
        self.best_streak = self.best_streak.max(self.current_streak);
    }
}

/// How a round's ordering is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolveMode {
    /// The group agrees on a full ordering and submits it at once.
    #[default]
    SortSubmit,
    /// Players commit one at a time; the verdict accumulates.
    Sequential,
}

/// Per-room rules chosen at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOptions {
    pub resolve_mode: ResolveMode,
    /// In sequential mode, keep playing after the first violation.
    pub allow_continue_after_fail: bool,
    /// Inclusive range hidden numbers are dealt from.
    pub deal_min: u32,
    pub deal_max: u32,
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self {
            resolve_mode: ResolveMode::SortSubmit,
            allow_continue_after_fail: false,
            deal_min: 1,
            deal_max: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// The public view of a participant, denormalized onto the room document
/// so it can be broadcast without exposing hidden numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: PlayerId,
    pub name: String,
    pub avatar: Option<String>,
    /// Monotonic join sequence within the room. Lower joined earlier.
    pub join_order: u64,
    pub joined_at: Timestamp,
}

/// The server-side sub-document for one participant
/// (`rooms/{roomId}/players/{participantId}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    pub avatar: Option<String>,
    /// The hidden value for the current round. Never broadcast.
    pub number: Option<u32>,
    pub join_order: u64,
    pub joined_at: Timestamp,
}

impl PlayerRecord {
    /// Projects the public part of this record.
    pub fn seat(&self) -> Seat {
        Seat {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            join_order: self.join_order,
            joined_at: self.joined_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One game session's authoritative state document (`rooms/{roomId}`).
///
/// Owned exclusively by the backend. Clients hold read-only copies that
/// are kept current by applying [`SyncPatch`](crate::SyncPatch)es.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub status: RoomStatus,
    /// Incremented exactly once per accepted mutation. Never decreases.
    pub status_version: u64,
    pub host_id: Option<PlayerId>,
    pub creator_id: PlayerId,
    pub round: u32,
    pub topic: Option<String>,
    pub order: Option<OrderState>,
    pub ui: UiFlags,
    #[serde(default)]
    pub seats: Vec<Seat>,
    #[serde(default)]
    pub stats: RoundStats,
    #[serde(default)]
    pub options: RoomOptions,
    #[serde(default)]
    pub next_join_order: u64,
    // Last accepted request id per command family.
    pub start_request_id: Option<RequestId>,
    pub next_request_id: Option<RequestId>,
    pub deal_request_id: Option<RequestId>,
    pub finalize_request_id: Option<RequestId>,
    pub reset_request_id: Option<RequestId>,
    pub last_active_at: Timestamp,
    /// Last accepted deal. Cleared when a round opens, so a round's first
    /// deal never waits out the previous round's limit.
    pub last_command_at: Option<Timestamp>,
    /// Last accepted `next_round`.
    #[serde(default)]
    pub last_round_at: Option<Timestamp>,
}

impl Room {
    /// A brand-new room in the lobby, with nobody seated yet.
    pub fn new(id: RoomId, creator_id: PlayerId, now: Timestamp) -> Self {
        Self {
            id,
            status: RoomStatus::Waiting,
            status_version: 0,
            host_id: None,
            creator_id,
            round: 0,
            topic: None,
            order: None,
            ui: UiFlags::default(),
            seats: Vec::new(),
            stats: RoundStats::default(),
            options: RoomOptions::default(),
            next_join_order: 0,
            start_request_id: None,
            next_request_id: None,
            deal_request_id: None,
            finalize_request_id: None,
            reset_request_id: None,
            last_active_at: now,
            last_command_at: None,
            last_round_at: None,
        }
    }

    /// Returns `true` if `player` currently holds a seat.
    pub fn is_seated(&self, player: &PlayerId) -> bool {
        self.seats.iter().any(|s| &s.id == player)
    }

    /// Returns `true` if `player` may issue host-only commands: a seated
    /// participant who is the current host or the room's creator.
    ///
    /// A creator who has left keeps no powers; the seated players have
    /// already handed the room to someone else.
    pub fn is_host_or_creator(&self, player: &PlayerId) -> bool {
        self.is_seated(player)
            && (self.host_id.as_ref() == Some(player) || &self.creator_id == player)
    }

    /// Looks up a seat by participant id.
    pub fn seat(&self, player: &PlayerId) -> Option<&Seat> {
        self.seats.iter().find(|s| &s.id == player)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    #[test]
    fn test_player_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&pid("u1")).unwrap();
        assert_eq!(json, "\"u1\"");
    }

    #[test]
    fn test_player_id_orders_lexically() {
        let mut ids = vec![pid("c"), pid("a"), pid("b")];
        ids.sort();
        assert_eq!(ids, vec![pid("a"), pid("b"), pid("c")]);
    }

    #[test]
    fn test_room_status_serializes_lowercase() {
        let json = serde_json::to_string(&RoomStatus::Finished).unwrap();
        assert_eq!(json, "\"finished\"");
        let status: RoomStatus = serde_json::from_str("\"clue\"").unwrap();
        assert_eq!(status, RoomStatus::Clue);
    }

    #[test]
    fn test_room_status_transitions() {
        assert!(RoomStatus::Waiting.can_transition_to(RoomStatus::Clue));
        assert!(RoomStatus::Clue.can_transition_to(RoomStatus::Reveal));
        assert!(RoomStatus::Reveal.can_transition_to(RoomStatus::Finished));
        assert!(RoomStatus::Finished.can_transition_to(RoomStatus::Clue));
        assert!(RoomStatus::Reveal.can_transition_to(RoomStatus::Waiting));
        assert!(!RoomStatus::Waiting.can_transition_to(RoomStatus::Reveal));
        assert!(!RoomStatus::Clue.can_transition_to(RoomStatus::Finished));
    }

    #[test]
    fn test_round_stats_record_tracks_streaks() {
        let mut stats = RoundStats::default();
        stats.record(true);
        stats.record(true);
        stats.record(true);
        stats.record(false);
        assert_eq!(
            stats,
            RoundStats {
                game_count: 4,
                success_count: 3,
                failure_count: 1,
                current_streak: 0,
                best_streak: 3,
            }
        );
    }

    #[test]
    fn test_order_state_is_complete() {
        let mut order = OrderState::new(2);
        assert!(!order.is_complete());
        order.list.push(pid("a"));
        order.list.push(pid("b"));
        assert!(order.is_complete());
        assert!(!OrderState::new(0).is_complete());
    }

    #[test]
    fn test_room_serializes_camel_case_fields() {
        let room = Room::new(RoomId::new("r1"), pid("host"), 1_000);
        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json["statusVersion"], 0);
        assert_eq!(json["creatorId"], "host");
        assert_eq!(json["ui"]["roundPreparing"], false);
        assert!(json["hostId"].is_null());
    }

    fn seat(id: &str, join_order: u64) -> Seat {
        Seat {
            id: pid(id),
            name: id.to_uppercase(),
            avatar: None,
            join_order,
            joined_at: 0,
        }
    }

    #[test]
    fn test_room_host_or_creator() {
        let mut room = Room::new(RoomId::new("r1"), pid("creator"), 0);
        room.host_id = Some(pid("host"));
        room.seats = vec![seat("creator", 0), seat("host", 1), seat("guest", 2)];
        assert!(room.is_host_or_creator(&pid("host")));
        assert!(room.is_host_or_creator(&pid("creator")));
        assert!(!room.is_host_or_creator(&pid("guest")));
    }

    #[test]
    fn test_room_host_or_creator_unseated_creator_denied() {
        let mut room = Room::new(RoomId::new("r1"), pid("creator"), 0);
        room.host_id = Some(pid("host"));
        room.seats = vec![seat("host", 1)];
        assert!(room.is_host_or_creator(&pid("host")));
        assert!(!room.is_host_or_creator(&pid("creator")));
    }
}
