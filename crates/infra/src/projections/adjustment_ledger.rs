use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use fleetforge_core::{AggregateId, Entity, TenantId};
use fleetforge_events::EventEnvelope;
use fleetforge_parts::{AdjustmentId, PartEvent, PartId};

use crate::read_model::TenantStore;

/// One immutable audit row per applied count adjustment.
///
/// Rows exist even for a zero delta: a variance-free count still leaves its
/// trace. The ledger never updates or deletes a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentRow {
    pub adjustment_id: AdjustmentId,
    pub tenant_id: TenantId,
    pub part_id: PartId,
    pub count_id: AggregateId,
    pub delta: i64,
    pub quantity_after: i64,
    pub occurred_at: DateTime<Utc>,
}

impl Entity for AdjustmentRow {
    type Id = AdjustmentId;

    fn id(&self) -> &Self::Id {
        &self.adjustment_id
    }
}

/// Where each (tenant, aggregate) stream has been folded up to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum AdjustmentLedgerError {
    #[error("malformed part event payload: {0}")]
    Deserialize(String),

    #[error("cross-tenant envelope rejected: {0}")]
    TenantIsolation(String),

    #[error("out-of-order envelope: cursor at {last}, got {found}")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Adjustment ledger projection.
///
/// Subscribes to the part stream; only `CountAdjustmentApplied` materializes
/// a row, every other part event just advances the cursor.
#[derive(Debug)]
pub struct AdjustmentLedgerProjection<S>
where
    S: TenantStore<AdjustmentId, AdjustmentRow>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> AdjustmentLedgerProjection<S>
where
    S: TenantStore<AdjustmentId, AdjustmentRow>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query one adjustment row.
    pub fn get(&self, tenant_id: TenantId, adjustment_id: &AdjustmentId) -> Option<AdjustmentRow> {
        self.store.get(tenant_id, adjustment_id)
    }

    /// List all adjustments for a tenant, oldest first.
    pub fn list(&self, tenant_id: TenantId) -> Vec<AdjustmentRow> {
        let mut rows = self.store.list(tenant_id);
        rows.sort_by_key(|r| (r.occurred_at, r.adjustment_id.0));
        rows
    }

    /// Adjustments settled against one part, oldest first.
    pub fn for_part(&self, tenant_id: TenantId, part_id: &PartId) -> Vec<AdjustmentRow> {
        let mut rows: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|r| r.part_id == *part_id)
            .collect();
        rows.sort_by_key(|r| (r.occurred_at, r.adjustment_id.0));
        rows
    }

    /// The adjustment settled for one cycle count, if reconciled.
    ///
    /// At most one row exists per count: the part aggregate applies each
    /// count's variance exactly once.
    pub fn for_count(&self, tenant_id: TenantId, count_id: AggregateId) -> Option<AdjustmentRow> {
        self.store
            .list(tenant_id)
            .into_iter()
            .find(|r| r.count_id == count_id)
    }

    /// Fold one published envelope into the ledger.
    ///
    /// A redelivered envelope is swallowed without writing a second row,
    /// which keeps the ledger honest under at-least-once delivery. Sequence
    /// gaps and mismatched payload ids come back as errors.
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), AdjustmentLedgerError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // A poisoned cursor lock is recovered; updates are single upserts, so
        // a panicking writer cannot leave the map half-written.
        let mut cursors = self.cursors.write().unwrap_or_else(PoisonError::into_inner);
        let key = CursorKey { tenant_id, aggregate_id };
        let last = *cursors.get(&key).unwrap_or(&0);

        if seq == 0 {
            return Err(AdjustmentLedgerError::NonMonotonicSequence { last, found: seq });
        }

        if seq <= last {
            // Replay of an applied envelope; nothing to do.
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            return Err(AdjustmentLedgerError::NonMonotonicSequence { last, found: seq });
        }

        let event: PartEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| AdjustmentLedgerError::Deserialize(e.to_string()))?;

        if let PartEvent::CountAdjustmentApplied(e) = event {
            if e.tenant_id != tenant_id {
                return Err(AdjustmentLedgerError::TenantIsolation(
                    "payload tenant_id disagrees with envelope tenant_id".to_string(),
                ));
            }
            if e.part_id.0 != aggregate_id {
                return Err(AdjustmentLedgerError::TenantIsolation(
                    "payload part_id disagrees with envelope aggregate_id".to_string(),
                ));
            }

            self.store.upsert(
                tenant_id,
                e.adjustment_id,
                AdjustmentRow {
                    adjustment_id: e.adjustment_id,
                    tenant_id: e.tenant_id,
                    part_id: e.part_id,
                    count_id: e.count_id,
                    delta: e.delta,
                    quantity_after: e.quantity_after,
                    occurred_at: e.occurred_at,
                },
            );
        }

        // Cursor moves for every part event, row or no row.
        cursors.insert(key, seq);
        Ok(())
    }

    /// Drop every derived row and replay the given envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), AdjustmentLedgerError> {
        self.cursors.write().unwrap_or_else(PoisonError::into_inner).clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Tenants named in the replay set lose their rows first.
        let mut tenants: Vec<_> = envs.iter().map(|e| e.tenant_id()).collect();
        tenants.sort_by(|a, b| a.as_uuid().as_bytes().cmp(b.as_uuid().as_bytes()));
        tenants.dedup();
        for tenant in tenants {
            self.store.clear_tenant(tenant);
        }

        // Replay order is fixed: first by tenant, then stream, then sequence.
        envs.sort_unstable_by_key(|e| {
            let tenant = *e.tenant_id().as_uuid().as_bytes();
            (tenant, *e.aggregate_id().as_uuid().as_bytes(), e.sequence_number())
        });

        for env in envs {
            self.apply_envelope(&env)?;
        }

        Ok(())
    }
}
