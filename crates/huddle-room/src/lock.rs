//! Per-room command lock with lease expiry.
//!
//! Every mutating command takes the room's lock before its transaction
//! and gives it back afterwards. The lock lives in the shared store
//! (`roomCommandLocks/{roomId}`), not in process memory, so any number of
//! stateless handlers can race on the same room.
//!
//! ```text
//!  acquire ──→ [locked, holder=h, updatedAt=t]
//!                │
//!                ├── release(h) ──→ [unlocked]
//!                └── now - t > ttl ──→ abandoned, next acquire takes over
//! ```
//!
//! A handler that crashes between acquire and release leaves a locked
//! record behind. The TTL bounds how long that wedges the room.

use std::sync::Arc;

use huddle_protocol::{RoomId, Timestamp};
use huddle_store::{Clock, DocumentStore, LockRecord, StoreError};
use rand::Rng;

use crate::{CommandConfig, CommandError};

// ---------------------------------------------------------------------------
// CommandLockManager
// ---------------------------------------------------------------------------

/// Acquires and releases room command locks.
///
/// Cheap to clone: the store and clock are shared.
pub struct CommandLockManager<S: DocumentStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: CommandConfig,
}

impl<S: DocumentStore> Clone for CommandLockManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<S: DocumentStore> CommandLockManager<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: CommandConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Tries once to take the lock for `holder`.
    ///
    /// Succeeds if the record is absent, unlocked, or older than `ttl_ms`.
    /// Returns `Ok(false)` while another holder's lease is still valid.
    pub async fn acquire(
        &self,
        room_id: &RoomId,
        holder: &str,
        ttl_ms: i64,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_ms();
        let outcome = self
            .store
            .transact_lock(room_id, |record| {
                let (acquired, took_over) = match record.as_ref() {
                    Some(r) if r.locked && !lease_expired(r, now, ttl_ms) => (false, None),
                    Some(r) if r.locked => (true, Some(r.holder.clone())),
                    _ => (true, None),
                };
                if acquired {
                    *record = Some(LockRecord {
                        locked: true,
                        holder: holder.to_owned(),
                        updated_at: now,
                    });
                }
                (acquired, took_over)
            })
            .await?;

        match outcome {
            (true, Some(previous)) => {
                tracing::warn!(%room_id, %previous, holder, "took over abandoned command lock");
            }
            (true, None) => tracing::trace!(%room_id, holder, "command lock acquired"),
            (false, _) => tracing::trace!(%room_id, holder, "command lock held elsewhere"),
        }
        Ok(outcome.0)
    }

    /// Marks the lock free, whoever holds it.
    pub async fn release(&self, room_id: &RoomId, holder: &str) -> Result<(), StoreError> {
        let now = self.clock.now_ms();
        let stolen = self
            .store
            .transact_lock(room_id, |record| {
                let stolen = record.as_ref().is_some_and(|r| r.locked && r.holder != holder);
                *record = Some(LockRecord {
                    locked: false,
                    holder: holder.to_owned(),
                    updated_at: now,
                });
                stolen
            })
            .await?;
        if stolen {
            tracing::debug!(%room_id, holder, "released a lock another holder had taken over");
        }
        Ok(())
    }

    /// Takes the lock under a fresh holder token, retrying with a short
    /// pause while it is held elsewhere.
    ///
    /// # Errors
    /// [`CommandError::Busy`] once `lock_retry_attempts` tries have failed.
    pub async fn acquire_with_retry(&self, room_id: &RoomId) -> Result<Lease<S>, CommandError> {
        let holder = generate_holder();
        let attempts = self.config.lock_retry_attempts.max(1);

        for attempt in 1..=attempts {
            if self.acquire(room_id, &holder, self.config.lock_ttl_ms).await? {
                return Ok(Lease {
                    room_id: room_id.clone(),
                    holder,
                    manager: self.clone(),
                    released: false,
                });
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.lock_retry_delay).await;
            }
        }

        tracing::debug!(%room_id, attempts, "command lock busy");
        Err(CommandError::Busy(room_id.clone()))
    }
}

fn lease_expired(record: &LockRecord, now: Timestamp, ttl_ms: i64) -> bool {
    now - record.updated_at > ttl_ms
}

/// A 32-character hex holder token.
fn generate_holder() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// A held command lock.
///
/// Call [`Lease::release`] when the command is done. If the lease is
/// dropped without that (the handler returned early, panicked, or its
/// future was dropped), `Drop` spawns the release instead.
pub struct Lease<S: DocumentStore> {
    room_id: RoomId,
    holder: String,
    manager: CommandLockManager<S>,
    released: bool,
}

impl<S: DocumentStore> Lease<S> {
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Releases the lock now.
    pub async fn release(mut self) -> Result<(), StoreError> {
        self.released = true;
        self.manager.release(&self.room_id, &self.holder).await
    }
}

impl<S: DocumentStore> Drop for Lease<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(room_id = %self.room_id, "lease dropped outside a runtime, left to expire");
            return;
        };
        let room_id = self.room_id.clone();
        let holder = std::mem::take(&mut self.holder);
        let manager = self.manager.clone();
        runtime.spawn(async move {
            if let Err(e) = manager.release(&room_id, &holder).await {
                tracing::warn!(%room_id, error = %e, "failed to release dropped lease");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_store::{ManualClock, MemoryStore};

    fn manager(clock: &ManualClock) -> CommandLockManager<MemoryStore> {
        CommandLockManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(clock.clone()),
            CommandConfig::default(),
        )
    }

    fn rid() -> RoomId {
        RoomId::new("r1")
    }

    #[tokio::test]
    async fn test_acquire_second_holder_fails_while_valid() {
        let clock = ManualClock::new(1_000);
        let locks = manager(&clock);

        assert!(locks.acquire(&rid(), "a", 8_000).await.unwrap());
        assert!(!locks.acquire(&rid(), "b", 8_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_acquire_after_ttl_takes_over() {
        let clock = ManualClock::new(1_000);
        let locks = manager(&clock);
        assert!(locks.acquire(&rid(), "a", 8_000).await.unwrap());

        clock.advance(8_000);
        assert!(!locks.acquire(&rid(), "b", 8_000).await.unwrap(), "exactly ttl is still held");

        clock.advance(1);
        assert!(locks.acquire(&rid(), "b", 8_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_frees_lock() {
        let clock = ManualClock::new(1_000);
        let locks = manager(&clock);
        assert!(locks.acquire(&rid(), "a", 8_000).await.unwrap());

        locks.release(&rid(), "a").await.unwrap();

        assert!(locks.acquire(&rid(), "b", 8_000).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_with_retry_busy_after_attempts() {
        let clock = ManualClock::new(1_000);
        let locks = manager(&clock);
        assert!(locks.acquire(&rid(), "other", 8_000).await.unwrap());

        let result = locks.acquire_with_retry(&rid()).await;

        assert!(matches!(result, Err(CommandError::Busy(_))));
    }

    #[tokio::test]
    async fn test_lease_drop_releases_lock() {
        let clock = ManualClock::new(1_000);
        let locks = manager(&clock);

        let lease = locks.acquire_with_retry(&rid()).await.unwrap();
        assert_eq!(lease.holder().len(), 32);
        drop(lease);
        // Let the spawned release run.
        for _ in 0..100 {
            if locks.store.lock_record(&rid()).await.is_some_and(|r| !r.locked) {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(locks.acquire(&rid(), "next", 8_000).await.unwrap());
    }
}
