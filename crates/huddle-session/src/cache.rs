//! The client's local copy of a room.

use std::sync::atomic::{AtomicU64, Ordering};

use huddle_protocol::{Room, SyncPatch};
use tokio::sync::watch;

use crate::reconcile::apply_patch;
use crate::PatchRejection;

/// Counters of what happened to incoming patches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub applied: u64,
    pub stale: u64,
    pub duplicate: u64,
    /// Patches rejected for having no room or the wrong room.
    pub mismatched: u64,
}

/// An explicitly owned store for one room's cached state.
///
/// Created by the session that owns it and dropped with it. Readers either
/// [`read`](Self::read) a snapshot or [`subscribe`](Self::subscribe) to
/// changes. All writes go through [`apply`](Self::apply), which enforces
/// version ordering, or [`replace`](Self::replace) for a full resync.
#[derive(Debug)]
pub struct RoomCache {
    room: watch::Sender<Option<Room>>,
    applied: AtomicU64,
    stale: AtomicU64,
    duplicate: AtomicU64,
    mismatched: AtomicU64,
}

impl RoomCache {
    /// An empty cache. Patches are rejected until a room is loaded.
    pub fn new() -> Self {
        let (room, _) = watch::channel(None);
        Self {
            room,
            applied: AtomicU64::new(0),
            stale: AtomicU64::new(0),
            duplicate: AtomicU64::new(0),
            mismatched: AtomicU64::new(0),
        }
    }

    /// A cache seeded with a room snapshot.
    pub fn with_room(room: Room) -> Self {
        let cache = Self::new();
        cache.replace(room);
        cache
    }

    /// A clone of the current room, if loaded.
    pub fn read(&self) -> Option<Room> {
        self.room.borrow().clone()
    }

    /// The cached version, or 0 when empty.
    pub fn status_version(&self) -> u64 {
        self.room.borrow().as_ref().map_or(0, |r| r.status_version)
    }

    /// A receiver notified on every accepted change.
    pub fn subscribe(&self) -> watch::Receiver<Option<Room>> {
        self.room.subscribe()
    }

    /// Overwrites the cache with a full snapshot, regardless of version.
    pub fn replace(&self, room: Room) {
        self.room.send_replace(Some(room));
    }

    /// Applies a patch if it is strictly newer than the cached room.
    ///
    /// # Errors
    /// The [`PatchRejection`] when the patch is not applied; the cache is
    /// unchanged in that case.
    pub fn apply(&self, patch: &SyncPatch) -> Result<u64, PatchRejection> {
        let mut outcome = Err(PatchRejection::NoRoom);
        self.room.send_if_modified(|slot| match apply_patch(slot.as_ref(), patch) {
            Ok(next) => {
                outcome = Ok(next.status_version);
                *slot = Some(next);
                true
            }
            Err(rejection) => {
                outcome = Err(rejection);
                false
            }
        });

        let counter = match &outcome {
            Ok(_) => &self.applied,
            Err(PatchRejection::Stale { .. }) => &self.stale,
            Err(PatchRejection::Duplicate { .. }) => &self.duplicate,
            Err(_) => &self.mismatched,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        outcome
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            applied: self.applied.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            mismatched: self.mismatched.load(Ordering::Relaxed),
        }
    }
}

impl Default for RoomCache {
    fn default() -> Self {
        Self::new()
    }
}
