//! Fan-out of committed envelopes to in-process consumers.
//!
//! The bus distributes committed events to consumers (projections, handlers,
//! background jobs). It sits *after* the event store in the pipeline:
//!
//! ```text
//! Command → Event Store (append) → Event Bus (publish) → Consumers
//! ```
//!
//! Events are stored first and published second, so a publication failure
//! never loses an event; the store remains the source of truth and committed
//! events can be republished.
//!
//! Delivery is **at-least-once** with no ordering promise across publishers.
//! Consumers must be idempotent: processing the same envelope twice has to
//! produce the same read model.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// One consumer's receiving end of the bus.
///
/// Each subscription receives a copy of every message published to the bus
/// (broadcast semantics). Subscriptions are single-consumer: use one per
/// thread.
///
/// ```ignore
/// let sub = bus.subscribe();
/// loop {
///     match sub.recv_timeout(Duration::from_secs(1)) {
///         Ok(envelope) => process(envelope)?,
///         Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
///         Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message for as long as it takes.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Poll for a message; never blocks.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Wait at most `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Transport seam between the store and the read side.
///
/// The contract is deliberately small: publish a message, hand out
/// subscriptions. No storage assumptions, no transport assumptions; an
/// in-memory channel fan-out satisfies it just as well as an external broker
/// would.
///
/// `publish()` may fail. Since events are appended before they are published,
/// the caller (typically the command dispatcher) can surface the error and
/// retry publication without risking event loss.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
