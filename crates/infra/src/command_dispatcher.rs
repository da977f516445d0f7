//! Command execution pipeline for event-sourced aggregates.
//!
//! One consistent path for every command in the system:
//!
//! ```text
//! load stream → validate → rehydrate → handle → append (ExpectedVersion) → publish
//! ```
//!
//! Dispatch loads the aggregate's history scoped to a tenant, rebuilds its
//! state, lets the pure `handle` decide new events, appends them with an
//! optimistic concurrency check pinned to the loaded version, and publishes
//! the committed events. The load-then-append window is what serializes
//! read-modify-write sequences (reconciliation adjusting a part that
//! receipts are also touching): a concurrent writer moves the stream head
//! and the append surfaces `DispatchError::Concurrency` for the caller to
//! retry.
//!
//! The dispatcher itself does no IO beyond the injected store and bus, so
//! the whole pipeline runs against in-memory implementations in tests.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use fleetforge_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, TenantId};
use fleetforge_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Dispatch failure, folding domain and infrastructure errors into one
/// surface for callers.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure; reload and retry.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// Cross-tenant or cross-aggregate stream access.
    #[error("tenant mismatch: {0}")]
    TenantIsolation(String),

    /// The aggregate refused the command's input.
    #[error("rejected by validation: {0}")]
    Validation(String),

    /// The aggregate refused the transition in its current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The count's variance has already been folded into stock.
    #[error("count already reconciled")]
    AlreadyReconciled,

    /// The aggregate stream does not exist.
    #[error("no such aggregate")]
    NotFound,

    /// Historical payloads failed to deserialize into the aggregate's event type.
    #[error("event deserialization failed: {0}")]
    Deserialize(String),

    /// The event store rejected the operation.
    #[error("store rejected the operation: {0}")]
    Store(EventStoreError),

    /// Publication failed after a successful append; events are durable,
    /// retrying the publish may duplicate delivery.
    #[error("append committed but publish failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => DispatchError::TenantIsolation(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvalidState(msg) => DispatchError::InvalidState(msg),
            DomainError::AlreadyReconciled => DispatchError::AlreadyReconciled,
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine.
///
/// Generic over the store and bus so tests run fully in memory and durable
/// backends can slot in without touching domain code.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run one command through the full pipeline.
    ///
    /// `make_aggregate` supplies a fresh, empty instance for rehydration
    /// (e.g. `|_, id| Part::empty(PartId::new(id))`), keeping the dispatcher
    /// ignorant of aggregate construction.
    ///
    /// A handle that decides no events (idempotent no-op) returns
    /// `Ok(vec![])` without touching the store or the bus.
    pub fn dispatch<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: fleetforge_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (tenant-scoped) and pin the expected version.
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate.
        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide (pure).
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic).
        let aggregate_type = aggregate_type.into();
        let mut uncommitted = Vec::with_capacity(decided.len());
        for event in &decided {
            uncommitted.push(UncommittedEvent::from_typed(
                tenant_id,
                aggregate_id,
                aggregate_type.clone(),
                Uuid::now_v7(),
                event,
            )?);
        }

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish after append.
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rehydrate an aggregate without executing a command.
    ///
    /// For read-your-write flows that need the authoritative stream state
    /// rather than an eventually consistent projection (returning a record
    /// right after a dispatch, pre-checking a transition).
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(TenantId, AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let mut aggregate = make_aggregate(tenant_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

/// Re-check what came back from the store before trusting it: right tenant,
/// right aggregate, strictly increasing sequence numbers.
fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(DispatchError::TenantIsolation(format!(
                "stream row {idx} belongs to another tenant"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::TenantIsolation(format!(
                "stream row {idx} belongs to another aggregate"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stream row with sequence_number 0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "loaded stream out of order: {} after {last}",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Deterministic replay order.
    let mut ordered = history.to_vec();
    ordered.sort_by_key(|e| e.sequence_number);

    for stored in ordered {
        let event: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&event);
    }

    Ok(())
}
