use std::collections::HashMap;
use std::sync::RwLock;

use fleetforge_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct StreamKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

/// Append-only store held in a process-local map.
///
/// Backs tests, benchmarks and single-node runs. Streams live in a single
/// `RwLock`ed map, so appends to different streams still serialize; good
/// enough for its purpose.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn last_sequence(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }
}

/// Every event in a batch must target the same stream with the same type.
fn validate_batch(events: &[UncommittedEvent]) -> Result<StreamKey, EventStoreError> {
    let first = &events[0];
    let key = StreamKey {
        tenant_id: first.tenant_id,
        aggregate_id: first.aggregate_id,
    };

    for (idx, e) in events.iter().enumerate() {
        if e.tenant_id != key.tenant_id {
            return Err(EventStoreError::TenantIsolation(format!(
                "batch mixes tenants (index {idx})"
            )));
        }
        if e.aggregate_id != key.aggregate_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "batch mixes aggregate streams (index {idx})"
            )));
        }
        if e.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "batch mixes aggregate types (index {idx})"
            )));
        }
    }

    Ok(key)
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let key = validate_batch(&events)?;
        let aggregate_type = events[0].aggregate_type.clone();

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("store mutex poisoned".to_string()))?;

        let stream = streams.entry(key).or_default();
        let current = Self::last_sequence(stream);

        if !expected.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "stream is at {current}, append expected {expected:?}"
            )));
        }

        // A stream keeps the aggregate type it was born with.
        if let Some(existing) = stream.first() {
            if existing.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream holds '{}', append attempted with '{}'",
                    existing.aggregate_type, aggregate_type
                )));
            }
        }

        let committed: Vec<StoredEvent> = events
            .into_iter()
            .zip(current + 1..)
            .map(|(e, seq)| e.into_stored(seq))
            .collect();
        stream.extend_from_slice(&committed);

        Ok(committed)
    }

    fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let key = StreamKey { tenant_id, aggregate_id };

        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("store mutex poisoned".to_string()))?;

        Ok(streams.get(&key).cloned().unwrap_or_default())
    }
}
