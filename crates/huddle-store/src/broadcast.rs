//! Last-value-wins patch broadcast (`roomSync/{roomId}/latest`).
//!
//! A client that falls behind doesn't need every patch it missed. Each
//! patch carries the full set of fields the command touched plus the
//! room's `statusVersion`, so the newest one is enough to catch up (and
//! a client that is too far behind refetches the room anyway). That is
//! exactly the contract of a Tokio `watch` channel: one slot per room,
//! overwritten on every send, and a receiver only ever sees the latest
//! value.
//!
//! The one thing `watch` doesn't do is refuse to go backwards. Two
//! handlers can finish their transactions in one order and publish in the
//! other, so [`MemoryBroadcast`] compares versions with
//! `send_if_modified` and keeps the higher one.

use std::collections::HashMap;
use std::future::Future;

use huddle_protocol::{RoomId, SyncPatch};
use tokio::sync::{watch, Mutex};

use crate::StoreError;

/// A receiver of the latest patch for one room. `None` until the first
/// publish.
pub type PatchReceiver = watch::Receiver<Option<SyncPatch>>;

/// Publish/subscribe keyed by room id.
///
/// Only the latest value per room is retained. Delivery order is not
/// guaranteed by the trait; subscribers must version-check.
pub trait PatchBroadcast: Send + Sync + 'static {
    /// Publishes a patch. Implementations may drop a patch that is older
    /// than the one already retained.
    fn publish(&self, patch: SyncPatch) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns the retained patch for a room, if any.
    fn latest(
        &self,
        room_id: &RoomId,
    ) -> impl Future<Output = Result<Option<SyncPatch>, StoreError>> + Send;

    /// Subscribes to a room's patches.
    fn subscribe(&self, room_id: &RoomId) -> impl Future<Output = PatchReceiver> + Send;

    /// Forgets a room's channel. Open receivers see the channel close; a
    /// later publish or subscribe starts a fresh one.
    fn close(&self, room_id: &RoomId) -> impl Future<Output = ()> + Send;
}

/// In-process broadcast on top of one `watch` channel per room.
#[derive(Default)]
pub struct MemoryBroadcast {
    channels: Mutex<HashMap<RoomId, watch::Sender<Option<SyncPatch>>>>,
}

impl MemoryBroadcast {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatchBroadcast for MemoryBroadcast {
    async fn publish(&self, patch: SyncPatch) -> Result<(), StoreError> {
        let mut channels = self.channels.lock().await;
        let room_id = patch.room_id.clone();
        let version = patch.status_version;
        let sender = channels
            .entry(room_id.clone())
            .or_insert_with(|| watch::channel(None).0);

        let replaced = sender.send_if_modified(|slot| match slot {
            Some(current) if current.status_version >= version => false,
            _ => {
                *slot = Some(patch);
                true
            }
        });

        if replaced {
            tracing::trace!(%room_id, status_version = version, "patch published");
        } else {
            tracing::debug!(%room_id, status_version = version, "older patch not retained");
        }
        Ok(())
    }

    async fn latest(&self, room_id: &RoomId) -> Result<Option<SyncPatch>, StoreError> {
        let channels = self.channels.lock().await;
        Ok(channels.get(room_id).and_then(|tx| tx.borrow().clone()))
    }

    async fn subscribe(&self, room_id: &RoomId) -> PatchReceiver {
        let mut channels = self.channels.lock().await;
        channels
            .entry(room_id.clone())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    async fn close(&self, room_id: &RoomId) {
        if self.channels.lock().await.remove(room_id).is_some() {
            tracing::debug!(%room_id, "patch channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_protocol::{CommandKind, PatchMeta, PatchSource, PlayerId, Room};

    fn patch(version: u64) -> SyncPatch {
        let mut room = Room::new(RoomId::new("r1"), PlayerId::new("h"), 0);
        room.status_version = version;
        SyncPatch::snapshot(
            &room,
            PatchMeta {
                source: PatchSource::Api,
                command: CommandKind::Start,
                request_id: None,
                ts: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_publish_keeps_highest_version() {
        let broadcast = MemoryBroadcast::new();
        broadcast.publish(patch(3)).await.unwrap();
        broadcast.publish(patch(2)).await.unwrap();

        let latest = broadcast.latest(&RoomId::new("r1")).await.unwrap().unwrap();
        assert_eq!(latest.status_version, 3);
    }

    #[tokio::test]
    async fn test_subscribe_before_publish_sees_update() {
        let broadcast = MemoryBroadcast::new();
        let mut rx = broadcast.subscribe(&RoomId::new("r1")).await;
        assert!(rx.borrow().is_none());

        broadcast.publish(patch(1)).await.unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|p| p.status_version), Some(1));
    }

    #[tokio::test]
    async fn test_latest_unknown_room_is_none() {
        let broadcast = MemoryBroadcast::new();
        assert!(broadcast.latest(&RoomId::new("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_ends_subscriptions_and_forgets_room() {
        let broadcast = MemoryBroadcast::new();
        let mut rx = broadcast.subscribe(&RoomId::new("r1")).await;
        broadcast.publish(patch(1)).await.unwrap();

        broadcast.close(&RoomId::new("r1")).await;

        assert!(rx.changed().await.is_err());
        assert!(broadcast.latest(&RoomId::new("r1")).await.unwrap().is_none());
        assert!(broadcast.channels.lock().await.is_empty());
    }
}
