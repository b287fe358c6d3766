//! Host interfaces for the shared storage area.

use tokio::sync::broadcast;
use uuid::Uuid;

use super::error::StoreResult;

/// A single shared key/value area.
///
/// Semantics mirror a browser's origin-scoped storage: string keys, string
/// values, wholesale overwrites, no partial updates. Implementations must be
/// safe to share across tasks; AuthKit always re-reads instead of caching.
pub trait StorageArea: Send + Sync {
    /// Reads the value stored under `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the area is unavailable.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the area is unavailable.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails or the area is unavailable.
    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// A mutation of one slot of the shared area, as observed by a non-writer.
#[derive(Debug, Clone)]
pub struct StorageChange {
    /// The key that was written or removed.
    pub key: String,
    /// The value before the mutation.
    pub old_value: Option<String>,
    /// The value after the mutation; `None` for removals.
    pub new_value: Option<String>,
    /// Identity of the writing handle.
    pub writer: Uuid,
}

/// Change notification for a storage area.
///
/// Follows the browser `storage`-event contract: a change is delivered to
/// every observing handle *except* the one that performed the write.
pub trait StorageEvents: Send + Sync {
    /// Returns a watcher over future mutations of this area.
    fn watch(&self) -> StorageWatcher;
}

/// An area that both stores values and notifies about sibling mutations.
pub trait SharedArea: StorageArea + StorageEvents {}

impl<T: StorageArea + StorageEvents + ?Sized> SharedArea for T {}

/// Stream of [`StorageChange`]s, filtered to exclude the owner's own writes.
#[derive(Debug)]
pub struct StorageWatcher {
    rx: broadcast::Receiver<StorageChange>,
    skip: Option<Uuid>,
}

impl StorageWatcher {
    /// Creates a watcher that yields every change on `rx`.
    #[must_use]
    pub const fn new(rx: broadcast::Receiver<StorageChange>) -> Self {
        Self { rx, skip: None }
    }

    /// Creates a watcher that skips changes written by `own_id`.
    #[must_use]
    pub const fn skipping(rx: broadcast::Receiver<StorageChange>, own_id: Uuid) -> Self {
        Self {
            rx,
            skip: Some(own_id),
        }
    }

    /// Waits for the next change made by another handle.
    ///
    /// Returns `None` once the area has been dropped. A lagging receiver
    /// skips the missed changes and keeps going; observers re-read the slot
    /// anyway, so a missed intermediate value is harmless.
    pub async fn next(&mut self) -> Option<StorageChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => {
                    if Some(change.writer) == self.skip {
                        continue;
                    }
                    return Some(change);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "storage watcher lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
