#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! AuthKit: a client SDK for server-driven authentication flows.
//!
//! Re-exports the flow engine ([`authkit_core`]), the session lifecycle
//! relay ([`authkit_session`]) and the storage primitives
//! ([`authkit_store`]) under one roof.

pub use authkit_core::*;
pub use authkit_session::{
    ChannelAction, RecordProbe, RelayConfig, SchedulerConfig, SessionChannel,
    SessionDetail, SessionEvent, SessionProbe, SessionRelay, SessionValidity,
};
pub use authkit_store::{MemoryArea, SharedArea, StorageArea, StorageEvents, StoreError};

/// Result type used across the SDK.
pub type AuthKitResult<T, E = AuthKitError> = std::result::Result<T, E>;
