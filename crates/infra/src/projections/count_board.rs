use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use fleetforge_core::{AggregateId, TenantId};
use fleetforge_counts::{CountNumber, CycleCountEvent, CycleCountId};
use fleetforge_events::EventEnvelope;
use fleetforge_parts::PartId;

use crate::read_model::TenantStore;

/// Per-part counting status: the open count (if any) and the date the last
/// count was recorded. The schedule generator reads these rows to decide
/// which parts are due.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountBoardRow {
    pub part_id: PartId,
    pub open_count: Option<CycleCountId>,
    pub last_completed_on: Option<NaiveDate>,
}

/// Cursor map key. Each (tenant, aggregate) stream tracks its own high-water mark.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum CountBoardError {
    #[error("malformed cycle count payload: {0}")]
    Deserialize(String),

    #[error("cross-tenant envelope rejected: {0}")]
    TenantIsolation(String),

    #[error("out-of-order envelope: cursor at {last}, got {found}")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Count board projection.
///
/// Consumes cycle count envelopes and maintains one row per part. Events
/// after `CountScheduled` carry only the count id, so the board keeps a
/// count-to-part index alongside the rows.
///
/// The board also owns count number allocation: `allocate_count_number`
/// advances a per-tenant sequence eagerly, and observed `CountScheduled`
/// events only raise the floor. Numbers stay unique even when allocation
/// runs ahead of the published stream; unused allocations leave gaps.
#[derive(Debug)]
pub struct CountBoardProjection<S>
where
    S: TenantStore<PartId, CountBoardRow>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
    count_index: RwLock<HashMap<(TenantId, CycleCountId), PartId>>,
    sequences: RwLock<HashMap<TenantId, u64>>,
}

impl<S> CountBoardProjection<S>
where
    S: TenantStore<PartId, CountBoardRow>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
            count_index: RwLock::new(HashMap::new()),
            sequences: RwLock::new(HashMap::new()),
        }
    }

    /// Query the row for one tenant/part.
    pub fn get(&self, tenant_id: TenantId, part_id: &PartId) -> Option<CountBoardRow> {
        self.store.get(tenant_id, part_id)
    }

    /// List all rows for a tenant.
    pub fn list(&self, tenant_id: TenantId) -> Vec<CountBoardRow> {
        self.store.list(tenant_id)
    }

    /// Whether the part currently has an open (scheduled or in-progress) count.
    pub fn has_open_count(&self, tenant_id: TenantId, part_id: &PartId) -> bool {
        self.store
            .get(tenant_id, part_id)
            .is_some_and(|row| row.open_count.is_some())
    }

    /// The date the part's last count was recorded, if any.
    pub fn last_completed_on(&self, tenant_id: TenantId, part_id: &PartId) -> Option<NaiveDate> {
        self.store
            .get(tenant_id, part_id)
            .and_then(|row| row.last_completed_on)
    }

    /// Claim the next count number for a tenant.
    ///
    /// The sequence advances immediately so concurrent schedulers never hand
    /// out the same number, even before their `CountScheduled` events reach
    /// this projection.
    pub fn allocate_count_number(&self, tenant_id: TenantId) -> CountNumber {
        let mut sequences = self.sequences.write().unwrap_or_else(PoisonError::into_inner);
        let next = sequences.get(&tenant_id).copied().unwrap_or(0) + 1;
        sequences.insert(tenant_id, next);
        CountNumber::from_sequence(next)
    }

    /// Fold one published envelope into the board.
    ///
    /// Duplicate delivery leaves the board unchanged; gaps in a stream's
    /// sequence and payloads routed under the wrong metadata are errors.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), CountBoardError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // Streams advance independently, one cursor each. A poisoned lock is
        // recovered: every map update below is a single insert, so a
        // panicking writer cannot leave a row half-applied.
        let mut cursors = self.cursors.write().unwrap_or_else(PoisonError::into_inner);
        let key = CursorKey { tenant_id, aggregate_id };
        let last = *cursors.get(&key).unwrap_or(&0);

        if seq == 0 {
            return Err(CountBoardError::NonMonotonicSequence { last, found: seq });
        }

        if seq <= last {
            // Already folded in; drop the redelivery.
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            return Err(CountBoardError::NonMonotonicSequence { last, found: seq });
        }

        let event: CycleCountEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| CountBoardError::Deserialize(e.to_string()))?;

        // The decoded event must belong to the stream it arrived on.
        let (event_tenant, count_id) = match &event {
            CycleCountEvent::CountScheduled(e) => (e.tenant_id, e.count_id),
            CycleCountEvent::CountStarted(e) => (e.tenant_id, e.count_id),
            CycleCountEvent::CountRecorded(e) => (e.tenant_id, e.count_id),
            CycleCountEvent::CountCancelled(e) => (e.tenant_id, e.count_id),
            CycleCountEvent::CountReconciled(e) => (e.tenant_id, e.count_id),
        };

        if event_tenant != tenant_id {
            return Err(CountBoardError::TenantIsolation(
                "payload tenant_id disagrees with envelope tenant_id".to_string(),
            ));
        }

        if count_id.0 != aggregate_id {
            return Err(CountBoardError::TenantIsolation(
                "payload count_id disagrees with envelope aggregate_id".to_string(),
            ));
        }

        match event {
            CycleCountEvent::CountScheduled(e) => {
                self.count_index
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert((tenant_id, e.count_id), e.part_id);

                // Raise the allocation floor; never lower it.
                {
                    let mut sequences =
                        self.sequences.write().unwrap_or_else(PoisonError::into_inner);
                    let floor = sequences.entry(tenant_id).or_insert(0);
                    *floor = (*floor).max(e.count_number.sequence());
                }

                let mut row = self.store.get(tenant_id, &e.part_id).unwrap_or(CountBoardRow {
                    part_id: e.part_id,
                    open_count: None,
                    last_completed_on: None,
                });
                row.open_count = Some(e.count_id);
                self.store.upsert(tenant_id, e.part_id, row);
            }
            CycleCountEvent::CountStarted(_) => {
                // Start keeps the count open; the board does not change.
            }
            CycleCountEvent::CountRecorded(e) => {
                if let Some(part_id) = self.part_for(tenant_id, e.count_id) {
                    if let Some(mut row) = self.store.get(tenant_id, &part_id) {
                        if row.open_count == Some(e.count_id) {
                            row.open_count = None;
                        }
                        row.last_completed_on = Some(e.occurred_at.date_naive());
                        self.store.upsert(tenant_id, part_id, row);
                    }
                }
            }
            CycleCountEvent::CountCancelled(e) => {
                if let Some(part_id) = self.part_for(tenant_id, e.count_id) {
                    if let Some(mut row) = self.store.get(tenant_id, &part_id) {
                        if row.open_count == Some(e.count_id) {
                            row.open_count = None;
                            self.store.upsert(tenant_id, part_id, row);
                        }
                    }
                }
            }
            CycleCountEvent::CountReconciled(_) => {
                // Reconciliation settles the part stream; the board already
                // shows the count as completed.
            }
        }

        // The cursor only moves once the event landed.
        cursors.insert(key, seq);
        Ok(())
    }

    fn part_for(&self, tenant_id: TenantId, count_id: CycleCountId) -> Option<PartId> {
        let index = self.count_index.read().unwrap_or_else(PoisonError::into_inner);
        index.get(&(tenant_id, count_id)).copied()
    }

    /// Reset the board and refold it from the given envelopes.
    ///
    /// Allocation sequences reset with the rows; replayed `CountScheduled`
    /// events restore the floor from the highest number seen.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), CountBoardError> {
        self.cursors.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.count_index.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.sequences.write().unwrap_or_else(PoisonError::into_inner).clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Wipe the tenants being replayed before the refold.
        let mut wiped: Vec<TenantId> = Vec::new();
        for env in &envs {
            let tenant = env.tenant_id();
            if !wiped.contains(&tenant) {
                self.store.clear_tenant(tenant);
                wiped.push(tenant);
            }
        }

        // Order by tenant, then stream, then sequence, so replays repeat exactly.
        envs.sort_by_key(|e| {
            (
                e.tenant_id().as_uuid().as_u128(),
                e.aggregate_id().as_uuid().as_u128(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
