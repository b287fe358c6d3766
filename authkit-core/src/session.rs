//! The shared session record.
//!
//! One storage slot per origin carries the metadata every sibling client
//! needs to judge session validity and schedule expiry. The bearer
//! credential itself lives in a cookie and is never stored here.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use authkit_store::StorageArea;

use crate::error::AuthKitError;

/// Storage slot holding the session record, shared by all clients of the
/// origin.
pub const SESSION_STORAGE_KEY: &str = "authkit::session";

/// Metadata describing the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Identifier of the signed-in user.
    pub user_id: String,
    /// Absolute expiration time, unix seconds.
    pub expiration: u64,
    /// Whether the creating flow ran to completion.
    pub auth_flow_completed: bool,
}

impl SessionRecord {
    /// Builds a record expiring `expiration_seconds` from now.
    #[must_use]
    pub fn expiring_in(
        user_id: impl Into<String>,
        expiration_seconds: u64,
        auth_flow_completed: bool,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            expiration: now_unix() + expiration_seconds,
            auth_flow_completed,
        }
    }

    /// Whether the record still describes a live session.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.expiration > now_unix()
    }

    /// Time left until expiration; zero once elapsed.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        Duration::from_secs(self.expiration.saturating_sub(now_unix()))
    }

    /// Reads the record from its storage slot, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read or holds an undecodable
    /// value.
    pub fn load(storage: &dyn StorageArea) -> Result<Option<Self>, AuthKitError> {
        let Some(raw) = storage.get(SESSION_STORAGE_KEY)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| AuthKitError::Serialization(err.to_string()))
    }

    /// Writes the record, replacing whatever the slot held.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be written.
    pub fn store(&self, storage: &dyn StorageArea) -> Result<(), AuthKitError> {
        let raw = serde_json::to_string(self)
            .map_err(|err| AuthKitError::Serialization(err.to_string()))?;
        storage.set(SESSION_STORAGE_KEY, &raw)?;
        Ok(())
    }

    /// Clears the slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be written.
    pub fn clear(storage: &dyn StorageArea) -> Result<(), AuthKitError> {
        storage.remove(SESSION_STORAGE_KEY)?;
        Ok(())
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use authkit_store::MemoryArea;

    use super::*;

    #[test]
    fn round_trips_through_storage() {
        let storage = MemoryArea::new().handle();
        let record = SessionRecord::expiring_in("user-1", 3600, true);
        record.store(&storage).unwrap();

        let loaded = SessionRecord::load(&storage).unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(loaded.is_valid());

        SessionRecord::clear(&storage).unwrap();
        assert_eq!(SessionRecord::load(&storage).unwrap(), None);
    }

    #[test]
    fn elapsed_expiration_is_invalid() {
        let record = SessionRecord {
            user_id: "user-1".to_string(),
            expiration: 0,
            auth_flow_completed: true,
        };
        assert!(!record.is_valid());
        assert_eq!(record.remaining(), Duration::ZERO);
    }

    #[test]
    fn undecodable_slot_is_a_serialization_error() {
        let storage = MemoryArea::new().handle();
        storage.set(SESSION_STORAGE_KEY, "not json").unwrap();
        let err = SessionRecord::load(&storage).unwrap_err();
        assert!(matches!(err, AuthKitError::Serialization(_)));
    }
}
