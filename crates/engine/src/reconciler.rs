//! Reconciliation: folding a completed count's variance into stock.
//!
//! The correctness-critical path of the engine. The variance is applied to
//! the part as a signed delta against its *current* quantity, never as an
//! absolute overwrite, so receipts and consumption that happened between
//! scheduling and reconciliation compose instead of being clobbered. The
//! dispatcher's load-then-append with a pinned expected version serializes
//! the read-modify-write against every other writer of the part stream; a
//! concurrent write surfaces `Conflict` for the caller to retry.
//!
//! Retry safety: the part aggregate applies at most one adjustment per
//! count id (a replay decides no events), so a crash between the stock
//! adjustment and the count's `MarkReconciled` converges on the next call.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use fleetforge_core::TenantId;
use fleetforge_counts::{CountStatus, CycleCount, CycleCountCommand, CycleCountId, MarkReconciled};
use fleetforge_infra::event_store::EventStore;
use fleetforge_infra::projections::AdjustmentRow;
use fleetforge_parts::{AdjustmentId, ApplyCountAdjustment, Part, PartCommand, PartEvent, PartId};

use crate::error::EngineError;
use crate::services::EngineServices;

/// What one successful reconciliation settled.
#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
    /// The count, now frozen (`is_reconciled == true`).
    pub count: CycleCount,
    /// The part, with the variance folded into quantity on hand.
    pub part: Part,
    /// The audit row for the applied delta.
    pub adjustment: AdjustmentRow,
}

/// Applies completed counts to part stock, exactly once per count.
#[derive(Clone)]
pub struct ReconciliationEngine {
    services: Arc<EngineServices>,
}

impl ReconciliationEngine {
    pub fn new(services: Arc<EngineServices>) -> Self {
        Self { services }
    }

    /// Reconcile one completed count.
    ///
    /// Fails with `InvalidState` for open or cancelled counts,
    /// `AlreadyReconciled` once applied, and `Conflict` when a concurrent
    /// writer moved the part stream (retryable).
    pub fn reconcile(
        &self,
        tenant_id: TenantId,
        count_id: CycleCountId,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, EngineError> {
        // 1) Pre-checks on the authoritative count state, before any side
        //    effect on the part.
        let count = self.services.load_count(tenant_id, count_id)?;
        if count.status() != CountStatus::Completed {
            return Err(EngineError::InvalidState(
                "only completed counts can be reconciled".to_string(),
            ));
        }
        if count.is_reconciled() {
            return Err(EngineError::AlreadyReconciled);
        }
        let part_id = count.part_id().ok_or_else(|| {
            EngineError::Infra("completed count carries no part id".to_string())
        })?;
        let variance = count.variance().ok_or_else(|| {
            EngineError::Infra("completed count carries no variance".to_string())
        })?;

        // 2) Fold the variance into stock. The aggregate applies at most one
        //    adjustment per count id, so a replayed call decides no events.
        let command = PartCommand::ApplyCountAdjustment(ApplyCountAdjustment {
            tenant_id,
            part_id,
            count_id: count_id.0,
            adjustment_id: AdjustmentId::new(),
            delta: variance,
            occurred_at,
        });
        self.services.dispatch_part(tenant_id, part_id, command)?;

        // The settled row comes from the stream, not from the fresh command:
        // on a retry the durable adjustment id is the first attempt's.
        let adjustment = self.find_settled_adjustment(tenant_id, part_id, count_id)?;

        // 3) Freeze the count.
        let command = CycleCountCommand::MarkReconciled(MarkReconciled {
            tenant_id,
            count_id,
            adjustment_id: adjustment.adjustment_id,
            occurred_at,
        });
        self.services.dispatch_count(tenant_id, count_id, command)?;

        // 4) Hand back the authoritative records.
        let count = self.services.load_count(tenant_id, count_id)?;
        let part = self.services.load_part(tenant_id, part_id)?;
        Ok(ReconciliationOutcome {
            count,
            part,
            adjustment,
        })
    }

    /// Find the adjustment a count settled on the part stream.
    fn find_settled_adjustment(
        &self,
        tenant_id: TenantId,
        part_id: PartId,
        count_id: CycleCountId,
    ) -> Result<AdjustmentRow, EngineError> {
        let stream = self
            .services
            .event_store
            .load_stream(tenant_id, part_id.0)
            .map_err(|e| EngineError::Infra(e.to_string()))?;

        for stored in stream {
            let event: PartEvent = serde_json::from_value(stored.payload)
                .map_err(|e| EngineError::Infra(e.to_string()))?;
            if let PartEvent::CountAdjustmentApplied(e) = event
                && e.count_id == count_id.0
            {
                return Ok(AdjustmentRow {
                    adjustment_id: e.adjustment_id,
                    tenant_id: e.tenant_id,
                    part_id: e.part_id,
                    count_id: e.count_id,
                    delta: e.delta,
                    quantity_after: e.quantity_after,
                    occurred_at: e.occurred_at,
                });
            }
        }

        Err(EngineError::Infra(
            "settled adjustment missing from the part stream".to_string(),
        ))
    }
}
