//! Durable side of the pipeline: tenant-scoped, append-only event streams.
//!
//! The [`EventStore`] trait makes no storage assumptions; the in-memory
//! implementation backs tests and single-node deployments.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
