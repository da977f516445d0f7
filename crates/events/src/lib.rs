//! Event mechanics shared by all domain crates.
//!
//! Everything here is transport- and storage-agnostic: the [`Event`]
//! contract, the envelope that carries tenant + stream metadata, a pub/sub
//! bus abstraction with an in-memory implementation, and a deterministic
//! decide-then-evolve helper for exercising aggregates.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
