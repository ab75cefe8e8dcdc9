//! Append-only loan history.
//!
//! Every committed loan transition lands here as a tenant-scoped stream entry.
//! The store makes no storage assumptions; the in-memory implementation backs
//! tests, development and single-process deployments.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
