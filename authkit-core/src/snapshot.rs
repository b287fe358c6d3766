//! Persisted flow snapshots.
//!
//! The only persisted member of a flow conversation is the *current* state:
//! its document plus the action that produced it, under a flow-scoped
//! storage key. Presence of the slot makes [`crate::state::State::create`]
//! rehydrate instead of fetching.

use serde::{Deserialize, Serialize};

use authkit_store::StorageArea;

use crate::{
    document::{ActionRef, FlowDocument},
    error::AuthKitError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FlowSnapshot {
    pub document: FlowDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_action: Option<ActionRef>,
}

impl FlowSnapshot {
    pub fn load(
        storage: &dyn StorageArea,
        key: &str,
    ) -> Result<Option<Self>, AuthKitError> {
        let Some(raw) = storage.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| AuthKitError::Serialization(err.to_string()))
    }

    pub fn store(
        &self,
        storage: &dyn StorageArea,
        key: &str,
    ) -> Result<(), AuthKitError> {
        let raw = serde_json::to_string(self)
            .map_err(|err| AuthKitError::Serialization(err.to_string()))?;
        storage.set(key, &raw)?;
        Ok(())
    }

    pub fn clear(storage: &dyn StorageArea, key: &str) -> Result<(), AuthKitError> {
        storage.remove(key)?;
        Ok(())
    }
}
