//! Storage-area primitives for AuthKit.
//!
//! All persistence in AuthKit goes through a single shared key/value area
//! per origin: one slot for the current flow snapshot, one slot for the
//! session record. Writers overwrite slots wholesale and readers always
//! re-read, because any sibling client ("tab") may have mutated a slot in
//! between.
//!
//! Hosts provide the area by implementing [`StorageArea`] (and
//! [`StorageEvents`] when they can observe mutations made by siblings).
//! [`MemoryArea`] is a complete in-process implementation whose handles
//! behave like sibling tabs: a write through one handle notifies every
//! *other* handle, never the writer itself.

mod area;
mod error;
mod memory;

pub use area::{SharedArea, StorageArea, StorageChange, StorageEvents, StorageWatcher};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryArea, MemoryHandle};
