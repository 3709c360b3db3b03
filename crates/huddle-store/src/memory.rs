//! In-process [`DocumentStore`] with optimistic concurrency.
//!
//! Every room document carries a revision. A transaction snapshots the
//! document and its revision, runs the body on the snapshot without
//! holding any lock, then commits only if the revision is unchanged. If
//! another writer got there first, the body is re-run on the new state.

use std::collections::HashMap;

use huddle_protocol::RoomId;
use tokio::sync::Mutex;

use crate::{DocumentStore, LockRecord, RoomDocument, StoreError, TxError};

/// Default number of optimistic attempts before reporting a conflict.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

struct Revisioned {
    revision: u64,
    doc: RoomDocument,
}

/// A [`DocumentStore`] that keeps everything in memory.
///
/// Suitable for a single backend process, for tests, and for the demo.
pub struct MemoryStore {
    rooms: Mutex<HashMap<RoomId, Revisioned>>,
    locks: Mutex<HashMap<RoomId, LockRecord>>,
    max_attempts: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }

    /// A store that gives up after `max_attempts` conflicting commits.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Returns the number of rooms stored.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Returns the raw lock record, for diagnostics.
    pub async fn lock_record(&self, room_id: &RoomId) -> Option<LockRecord> {
        self.locks.lock().await.get(room_id).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    async fn create_room(&self, doc: RoomDocument) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        let room_id = doc.room.id.clone();
        if rooms.contains_key(&room_id) {
            return Err(StoreError::AlreadyExists(room_id));
        }
        rooms.insert(room_id, Revisioned { revision: 0, doc });
        Ok(())
    }

    async fn read_room(&self, room_id: &RoomId) -> Result<Option<RoomDocument>, StoreError> {
        let rooms = self.rooms.lock().await;
        Ok(rooms.get(room_id).map(|r| r.doc.clone()))
    }

    async fn transact_room<T, E, F>(&self, room_id: &RoomId, mut f: F) -> Result<T, TxError<E>>
    where
        T: Send,
        E: Send,
        F: FnMut(&mut RoomDocument) -> Result<T, E> + Send,
    {
        for attempt in 1..=self.max_attempts {
            let (revision, mut draft) = {
                let rooms = self.rooms.lock().await;
                let current = rooms
                    .get(room_id)
                    .ok_or_else(|| StoreError::NotFound(room_id.clone()))?;
                (current.revision, current.doc.clone())
            };

            let value = f(&mut draft).map_err(TxError::Aborted)?;

            let mut rooms = self.rooms.lock().await;
            let current = rooms
                .get_mut(room_id)
                .ok_or_else(|| StoreError::NotFound(room_id.clone()))?;
            if current.revision != revision {
                tracing::debug!(%room_id, attempt, "transaction conflict, retrying");
                continue;
            }
            current.revision += 1;
            current.doc = draft;
            return Ok(value);
        }

        tracing::warn!(%room_id, attempts = self.max_attempts, "transaction retries exhausted");
        Err(TxError::Store(StoreError::Conflict {
            room_id: room_id.clone(),
            attempts: self.max_attempts,
        }))
    }

    async fn transact_lock<T, F>(&self, room_id: &RoomId, mut f: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnMut(&mut Option<LockRecord>) -> T + Send,
    {
        // The lock map is small and the body is trivial, so this runs
        // pessimistically under the mutex; no retry loop needed.
        let mut locks = self.locks.lock().await;
        let mut draft = locks.get(room_id).cloned();
        let value = f(&mut draft);
        match draft {
            Some(record) => {
                locks.insert(room_id.clone(), record);
            }
            None => {
                locks.remove(room_id);
            }
        }
        Ok(value)
    }
}
