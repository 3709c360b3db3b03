//! Presence records as written by the heartbeat sink
//! (`presence/{roomId}/{participantId}/{connectionId}`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{PlayerId, RoomId, Timestamp};

/// One logical client connection (a browser tab, an app instance).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The last heartbeat state of one connection.
///
/// Every field is optional because records written by older clients (or
/// partially written by a crashed one) may lack any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_at: Option<Timestamp>,
}

impl ConnectionRecord {
    /// A fresh online heartbeat stamped at `ts`.
    pub fn online_at(ts: Timestamp) -> Self {
        Self {
            online: Some(true),
            ts: Some(ts),
            offline_at: None,
        }
    }

    /// An explicit disconnect stamped at `ts`.
    pub fn offline_at(ts: Timestamp) -> Self {
        Self {
            online: Some(false),
            ts: Some(ts),
            offline_at: Some(ts),
        }
    }
}

/// All connections of one participant.
pub type ConnectionMap = BTreeMap<ConnectionId, ConnectionRecord>;

/// All participants' connections in one room.
pub type PresenceSnapshot = BTreeMap<PlayerId, ConnectionMap>;

/// A single write accepted by the heartbeat sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceWrite {
    pub connection_id: ConnectionId,
    pub participant_id: PlayerId,
    pub room_id: RoomId,
    pub online: bool,
    pub server_timestamp: Timestamp,
}

impl PresenceWrite {
    /// The record this write leaves behind for its connection key.
    pub fn record(&self) -> ConnectionRecord {
        if self.online {
            ConnectionRecord::online_at(self.server_timestamp)
        } else {
            ConnectionRecord::offline_at(self.server_timestamp)
        }
    }
}
