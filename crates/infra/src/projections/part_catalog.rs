use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use fleetforge_core::{AggregateId, TenantId};
use fleetforge_events::EventEnvelope;
use fleetforge_parts::{AbcClass, PartEvent, PartId};

use crate::read_model::TenantStore;

/// Queryable part catalog: identity, stock level, cost and class per part.
///
/// Classification and schedule generation enumerate their candidates from
/// these rows; the aggregates stay authoritative for the decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartCatalogRow {
    pub part_id: PartId,
    pub part_number: String,
    pub name: String,
    pub quantity_on_hand: i64,
    pub unit_cost_cents: i64,
    pub usage_quantity: i64,
    pub abc_class: Option<AbcClass>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// One cursor per (tenant, aggregate) stream; anything at or below it already landed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum PartCatalogError {
    #[error("malformed part event payload: {0}")]
    Deserialize(String),

    #[error("cross-tenant envelope rejected: {0}")]
    TenantIsolation(String),

    #[error("out-of-order envelope: cursor at {last}, got {found}")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Part catalog projection.
///
/// Consumes published envelopes (JSON payloads) and maintains a tenant-isolated
/// read model. Rows are disposable and rebuildable from the event stream.
#[derive(Debug)]
pub struct PartCatalogProjection<S>
where
    S: TenantStore<PartId, PartCatalogRow>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> PartCatalogProjection<S>
where
    S: TenantStore<PartId, PartCatalogRow>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query the row for one tenant/part.
    pub fn get(&self, tenant_id: TenantId, part_id: &PartId) -> Option<PartCatalogRow> {
        self.store.get(tenant_id, part_id)
    }

    /// List all parts for a tenant.
    pub fn list(&self, tenant_id: TenantId) -> Vec<PartCatalogRow> {
        self.store.list(tenant_id)
    }

    /// Fold one published envelope into the catalog.
    ///
    /// Redelivery is harmless: anything at or below the stream cursor returns
    /// `Ok` without touching a row. Sequence gaps and payloads that disagree
    /// with the envelope metadata are refused instead of applied.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), PartCatalogError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // A poisoned cursor lock is recovered; updates are single upserts, so
        // a panicking writer cannot leave the map half-written.
        let mut cursors = self.cursors.write().unwrap_or_else(PoisonError::into_inner);
        let key = CursorKey { tenant_id, aggregate_id };
        let last = *cursors.get(&key).unwrap_or(&0);

        if seq == 0 {
            return Err(PartCatalogError::NonMonotonicSequence { last, found: seq });
        }

        if seq <= last {
            // Seen before; redelivery ends here.
            return Ok(());
        }

        if seq != last + 1 && last != 0 {
            // First contact with a stream accepts any positive sequence;
            // from then on only the immediate successor passes.
            return Err(PartCatalogError::NonMonotonicSequence { last, found: seq });
        }

        let event: PartEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| PartCatalogError::Deserialize(e.to_string()))?;

        // The payload names its own tenant and part; both must agree
        // with the envelope routing.
        let (event_tenant, part_id) = match &event {
            PartEvent::PartCreated(e) => (e.tenant_id, e.part_id),
            PartEvent::StockReceived(e) => (e.tenant_id, e.part_id),
            PartEvent::StockConsumed(e) => (e.tenant_id, e.part_id),
            PartEvent::UnitCostChanged(e) => (e.tenant_id, e.part_id),
            PartEvent::PartReclassified(e) => (e.tenant_id, e.part_id),
            PartEvent::CountAdjustmentApplied(e) => (e.tenant_id, e.part_id),
            PartEvent::PartDeactivated(e) => (e.tenant_id, e.part_id),
        };

        if event_tenant != tenant_id {
            return Err(PartCatalogError::TenantIsolation(
                "payload tenant_id disagrees with envelope tenant_id".to_string(),
            ));
        }

        if part_id.0 != aggregate_id {
            return Err(PartCatalogError::TenantIsolation(
                "payload part_id disagrees with envelope aggregate_id".to_string(),
            ));
        }

        match event {
            PartEvent::PartCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.part_id,
                    PartCatalogRow {
                        part_id: e.part_id,
                        part_number: e.part_number,
                        name: e.name,
                        quantity_on_hand: e.initial_quantity,
                        unit_cost_cents: e.unit_cost_cents,
                        usage_quantity: 0,
                        abc_class: None,
                        active: true,
                        created_at: e.occurred_at,
                    },
                );
            }
            PartEvent::StockReceived(e) => {
                if let Some(mut row) = self.store.get(tenant_id, &e.part_id) {
                    row.quantity_on_hand += e.quantity;
                    self.store.upsert(tenant_id, e.part_id, row);
                }
            }
            PartEvent::StockConsumed(e) => {
                if let Some(mut row) = self.store.get(tenant_id, &e.part_id) {
                    row.quantity_on_hand -= e.quantity;
                    row.usage_quantity += e.quantity;
                    self.store.upsert(tenant_id, e.part_id, row);
                }
            }
            PartEvent::UnitCostChanged(e) => {
                if let Some(mut row) = self.store.get(tenant_id, &e.part_id) {
                    row.unit_cost_cents = e.unit_cost_cents;
                    self.store.upsert(tenant_id, e.part_id, row);
                }
            }
            PartEvent::PartReclassified(e) => {
                if let Some(mut row) = self.store.get(tenant_id, &e.part_id) {
                    row.abc_class = Some(e.class);
                    self.store.upsert(tenant_id, e.part_id, row);
                }
            }
            PartEvent::CountAdjustmentApplied(e) => {
                if let Some(mut row) = self.store.get(tenant_id, &e.part_id) {
                    // The event carries the post-adjustment level; take it as-is
                    // rather than re-deriving from the delta.
                    row.quantity_on_hand = e.quantity_after;
                    self.store.upsert(tenant_id, e.part_id, row);
                }
            }
            PartEvent::PartDeactivated(e) => {
                if let Some(mut row) = self.store.get(tenant_id, &e.part_id) {
                    row.active = false;
                    self.store.upsert(tenant_id, e.part_id, row);
                }
            }
        }

        // Advance cursor after successful apply. Mutations without a row
        // still advance: the stream guarantees creation came first, so a
        // missing row means the row store was cleared, not a gap.
        cursors.insert(key, seq);
        Ok(())
    }

    /// Discard derived rows and refold the catalog from the given envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), PartCatalogError> {
        self.cursors.write().unwrap_or_else(PoisonError::into_inner).clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Every tenant present in the replay set starts from nothing.
        let mut tenants: Vec<_> = envs.iter().map(|e| e.tenant_id()).collect();
        tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
        tenants.dedup();
        for tenant in tenants {
            self.store.clear_tenant(tenant);
        }

        // Sort so a rerun visits envelopes in the same order every time.
        envs.sort_by_key(|e| {
            let tenant = *e.tenant_id().as_uuid().as_bytes();
            let stream = *e.aggregate_id().as_uuid().as_bytes();
            (tenant, stream, e.sequence_number())
        });

        envs.iter().try_for_each(|env| self.apply_envelope(env))
    }
}
