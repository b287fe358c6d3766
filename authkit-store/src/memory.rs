//! In-memory storage area with per-handle change notification.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::broadcast;
use uuid::Uuid;

use super::{
    area::{StorageArea, StorageChange, StorageEvents, StorageWatcher},
    error::{StoreError, StoreResult},
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A process-local storage area shared by any number of handles.
///
/// Each [`MemoryHandle`] models one sibling client ("tab") of the same
/// origin: all handles read and write the same slots, and a write through
/// one handle is observed by the watchers of every other handle.
#[derive(Debug, Clone)]
pub struct MemoryArea {
    slots: Arc<Mutex<HashMap<String, String>>>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryArea {
    /// Creates an empty area.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }

    /// Creates a new handle onto this area.
    #[must_use]
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            id: Uuid::new_v4(),
            slots: Arc::clone(&self.slots),
            changes: self.changes.clone(),
        }
    }
}

impl Default for MemoryArea {
    fn default() -> Self {
        Self::new()
    }
}

/// One handle onto a [`MemoryArea`].
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    id: Uuid,
    slots: Arc<Mutex<HashMap<String, String>>>,
    changes: broadcast::Sender<StorageChange>,
}

impl MemoryHandle {
    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.slots
            .lock()
            .map_err(|_| StoreError::Unavailable("storage mutex poisoned".to_string()))
    }

    fn publish(&self, key: &str, old_value: Option<String>, new_value: Option<String>) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            old_value,
            new_value,
            writer: self.id,
        });
    }
}

impl StorageArea for MemoryHandle {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let old_value = {
            let mut slots = self.lock()?;
            slots.insert(key.to_string(), value.to_string())
        };
        self.publish(key, old_value, Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let old_value = {
            let mut slots = self.lock()?;
            slots.remove(key)
        };
        if old_value.is_some() {
            self.publish(key, old_value, None);
        }
        Ok(())
    }
}

impl StorageEvents for MemoryHandle {
    fn watch(&self) -> StorageWatcher {
        StorageWatcher::skipping(self.changes.subscribe(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_slots() {
        let area = MemoryArea::new();
        let a = area.handle();
        let b = area.handle();

        a.set("k", "v1").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v1"));

        b.set("k", "v2").unwrap();
        assert_eq!(a.get("k").unwrap().as_deref(), Some("v2"));

        a.remove("k").unwrap();
        assert_eq!(b.get("k").unwrap(), None);
    }

    #[tokio::test]
    async fn writes_notify_other_handles_only() {
        let area = MemoryArea::new();
        let writer = area.handle();
        let observer = area.handle();

        let mut own = writer.watch();
        let mut other = observer.watch();

        writer.set("session", "r1").unwrap();

        let change = other.next().await.expect("observer sees the write");
        assert_eq!(change.key, "session");
        assert_eq!(change.old_value, None);
        assert_eq!(change.new_value.as_deref(), Some("r1"));

        // The writer's own watcher must stay silent; a follow-up write from
        // the observer is the next thing it may see.
        observer.set("session", "r2").unwrap();
        let change = own.next().await.expect("writer sees the sibling write");
        assert_eq!(change.old_value.as_deref(), Some("r1"));
        assert_eq!(change.new_value.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn removing_missing_key_is_silent() {
        let area = MemoryArea::new();
        let a = area.handle();
        let b = area.handle();

        let mut watcher = b.watch();
        a.remove("absent").unwrap();
        a.set("present", "x").unwrap();

        // The only observable change is the set; the no-op removal was
        // swallowed.
        let change = watcher.next().await.unwrap();
        assert_eq!(change.key, "present");
    }
}
