//! Sync patches: versioned descriptions of what a room looks like after a
//! mutation, pushed to every client over the broadcast channel.
//!
//! A patch never carries hidden numbers. It carries a [`RoomPatch`] whose
//! fields are all optional: a field that is `None` was not declared by the
//! patch and must be left alone by the receiver.
//!
//! Nullable room fields (`hostId`, `topic`, `order`) use a double `Option`:
//!
//! ```text
//! field absent     → None           (keep the cached value)
//! field: null      → Some(None)     (clear it)
//! field: <value>   → Some(Some(v))  (overwrite)
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    CommandKind, OrderState, PlayerId, RequestId, Room, RoomId, RoomOptions, RoomStatus,
    RoundStats, Seat, Timestamp, UiFlags,
};

/// Deserializes a present field (even `null`) as `Some(..)`.
///
/// Paired with `#[serde(default)]`, an absent field stays `None`.
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// UiPatch
// ---------------------------------------------------------------------------

/// A partial update of [`UiFlags`]. Only keys present overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_preparing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reveal_pending: Option<bool>,
}

impl UiPatch {
    /// A patch declaring every flag.
    pub fn full(flags: UiFlags) -> Self {
        Self {
            round_preparing: Some(flags.round_preparing),
            recall_open: Some(flags.recall_open),
            reveal_pending: Some(flags.reveal_pending),
        }
    }

    /// Overlays the declared keys onto `flags`.
    pub fn merge_into(&self, flags: UiFlags) -> UiFlags {
        UiFlags {
            round_preparing: self.round_preparing.unwrap_or(flags.round_preparing),
            recall_open: self.recall_open.unwrap_or(flags.recall_open),
            reveal_pending: self.reveal_pending.unwrap_or(flags.reveal_pending),
        }
    }
}

// ---------------------------------------------------------------------------
// RoomPatch
// ---------------------------------------------------------------------------

/// A partial [`Room`]: the fields a patch declares.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RoomStatus>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub host_id: Option<Option<PlayerId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub topic: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub order: Option<Option<OrderState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seats: Option<Vec<Seat>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<RoundStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RoomOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<Timestamp>,
}

impl RoomPatch {
    /// Declares every synced field of `room`.
    ///
    /// The broadcast channel is last-value-wins, so a client can miss
    /// intermediate patches. A full projection lets it converge from any
    /// single patch it does receive.
    pub fn full(room: &Room) -> Self {
        Self {
            status: Some(room.status),
            host_id: Some(room.host_id.clone()),
            round: Some(room.round),
            topic: Some(room.topic.clone()),
            order: Some(room.order.clone()),
            ui: Some(UiPatch::full(room.ui)),
            seats: Some(room.seats.clone()),
            stats: Some(room.stats),
            options: Some(room.options),
            last_active_at: Some(room.last_active_at),
        }
    }

    /// Returns a new room with the declared fields overlaid on `room`.
    ///
    /// `room` itself is left untouched; `ui` is merged key by key.
    pub fn apply_to(&self, room: &Room) -> Room {
        let mut next = room.clone();
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(host_id) = &self.host_id {
            next.host_id = host_id.clone();
        }
        if let Some(round) = self.round {
            next.round = round;
        }
        if let Some(topic) = &self.topic {
            next.topic = topic.clone();
        }
        if let Some(order) = &self.order {
            next.order = order.clone();
        }
        if let Some(ui) = &self.ui {
            next.ui = ui.merge_into(room.ui);
        }
        if let Some(seats) = &self.seats {
            next.seats = seats.clone();
        }
        if let Some(stats) = self.stats {
            next.stats = stats;
        }
        if let Some(options) = self.options {
            next.options = options;
        }
        if let Some(ts) = self.last_active_at {
            next.last_active_at = ts;
        }
        next
    }
}

// ---------------------------------------------------------------------------
// SyncPatch
// ---------------------------------------------------------------------------

/// Where a patch originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchSource {
    /// A command endpoint accepted a mutation.
    Api,
    /// The engine itself (room creation, maintenance).
    System,
}

/// Provenance of a patch, for logging and client-side diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchMeta {
    pub source: PatchSource,
    pub command: CommandKind,
    pub request_id: Option<RequestId>,
    pub ts: Timestamp,
}

/// The immutable message broadcast after every accepted mutation
/// (`roomSync/{roomId}/latest`).
///
/// `status_version` is the sole ordering authority: receivers drop any
/// patch whose version is not strictly newer than what they hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPatch {
    pub room_id: RoomId,
    pub status_version: u64,
    pub room: RoomPatch,
    pub meta: PatchMeta,
}

impl SyncPatch {
    /// Builds a full-projection patch for `room` at its current version.
    pub fn snapshot(room: &Room, meta: PatchMeta) -> Self {
        Self {
            room_id: room.id.clone(),
            status_version: room.status_version,
            room: RoomPatch::full(room),
            meta,
        }
    }
}
