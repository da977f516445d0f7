use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use fleetforge_core::{AggregateId, ExpectedVersion, TenantId};

/// An event decided by an aggregate but not yet appended to its stream.
///
/// Lifecycle: typed domain event → `UncommittedEvent` (metadata attached,
/// payload serialized) → `StoredEvent` (sequence number assigned by the
/// store) → `EventEnvelope` (published on the bus).
///
/// Build these with [`UncommittedEvent::from_typed`], which serializes the
/// payload and captures `event_type`/`event_version`/`occurred_at` so the
/// stream stays deserializable later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    /// Serialized domain event; its shape belongs to the aggregate crate.
    pub payload: JsonValue,
}

/// A persisted event with its position in the aggregate stream.
///
/// Sequence numbers are assigned at append, start at 1, increase by one per
/// event, and never change. They drive replay ordering, optimistic
/// concurrency and projection cursors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub tenant_id: TenantId,
    pub aggregate_id: AggregateId,
    pub aggregate_type: String,

    /// 1-based position within the aggregate stream.
    pub sequence_number: u64,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    /// Serialized domain event, exactly as appended.
    pub payload: JsonValue,
}

impl StoredEvent {
    /// Stream version after this event, which equals its sequence number.
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Wrap this event as a tenant-scoped envelope for publication.
    pub fn to_envelope(&self) -> fleetforge_events::EventEnvelope<JsonValue> {
        fleetforge_events::EventEnvelope::new(
            self.event_id,
            self.tenant_id,
            self.aggregate_id,
            self.aggregate_type.clone(),
            self.sequence_number,
            self.payload.clone(),
        )
    }
}

/// Event store failure.
///
/// These are infrastructure failures; domain rule violations never reach
/// this enum.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("version conflict: {0}")]
    Concurrency(String),

    #[error("append crossed a tenant boundary: {0}")]
    TenantIsolation(String),

    #[error("stream belongs to a different aggregate type: {0}")]
    AggregateTypeMismatch(String),

    #[error("append rejected: {0}")]
    InvalidAppend(String),
}

/// Append-only, tenant-scoped event persistence.
///
/// One stream per aggregate instance, keyed `(tenant_id, aggregate_id)`.
/// Every implementation has to:
/// - reject cross-tenant and cross-aggregate batches,
/// - check `ExpectedVersion` against the current stream head before writing,
/// - assign sequence numbers starting at `current + 1` with no gaps,
/// - persist a batch atomically,
/// - keep the stream's `aggregate_type` stable for its whole life.
pub trait EventStore: Send + Sync {
    /// Append a batch of events to one stream.
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Load the full stream for a tenant + aggregate, in sequence order.
    /// A stream that does not exist yet loads as empty.
    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;
}

// Stores are shared via Arc across the dispatcher, the engine services, and
// the test pipelines; forward through the pointer.
impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, expected)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(tenant_id, aggregate_id)
    }
}

impl UncommittedEvent {
    /// Fix this event at `sequence_number` within its stream.
    pub fn into_stored(self, sequence_number: u64) -> StoredEvent {
        StoredEvent {
            event_id: self.event_id,
            tenant_id: self.tenant_id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            sequence_number,
            event_type: self.event_type,
            event_version: self.event_version,
            occurred_at: self.occurred_at,
            payload: self.payload,
        }
    }

    /// Build an uncommitted event from a typed domain event.
    pub fn from_typed<E>(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        event_id: Uuid,
        event: &E,
    ) -> Result<Self, EventStoreError>
    where
        E: fleetforge_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;

        Ok(Self {
            event_id,
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}
