//! Heartbeat sink (`presence/{roomId}/{participantId}/{connectionId}`).
//!
//! Writes are overwrite-only per connection key. Each connection is owned
//! by exactly one client, so no locking beyond the map itself is needed.

use std::collections::HashMap;
use std::future::Future;

use huddle_protocol::{PlayerId, PresenceSnapshot, PresenceWrite, RoomId};
use tokio::sync::Mutex;

use crate::StoreError;

/// Where heartbeats land and where the aggregator reads them back.
pub trait PresenceSink: Send + Sync + 'static {
    /// Overwrites the record for one connection.
    fn record(&self, write: PresenceWrite) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Reads every connection of every participant in a room.
    fn snapshot(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<PresenceSnapshot, StoreError>> + Send;

    /// Drops all connections of one participant (they left the room).
    fn remove_participant(
        &self,
        room_id: &RoomId,
        participant: &PlayerId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Drops every connection recorded for a room.
    fn clear_room(&self, room_id: &RoomId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// An in-memory [`PresenceSink`].
#[derive(Default)]
pub struct MemoryPresence {
    rooms: Mutex<HashMap<RoomId, PresenceSnapshot>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceSink for MemoryPresence {
    async fn record(&self, write: PresenceWrite) -> Result<(), StoreError> {
        let record = write.record();
        tracing::trace!(
            room_id = %write.room_id,
            player_id = %write.participant_id,
            connection_id = %write.connection_id,
            online = write.online,
            "presence write"
        );
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(write.room_id)
            .or_default()
            .entry(write.participant_id)
            .or_default()
            .insert(write.connection_id, record);
        Ok(())
    }

    async fn snapshot(&self, room_id: &RoomId) -> Result<PresenceSnapshot, StoreError> {
        let rooms = self.rooms.lock().await;
        Ok(rooms.get(room_id).cloned().unwrap_or_default())
    }

    async fn remove_participant(
        &self,
        room_id: &RoomId,
        participant: &PlayerId,
    ) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        if let Some(snapshot) = rooms.get_mut(room_id) {
            snapshot.remove(participant);
        }
        Ok(())
    }

    async fn clear_room(&self, room_id: &RoomId) -> Result<(), StoreError> {
        self.rooms.lock().await.remove(room_id);
        Ok(())
    }
}
