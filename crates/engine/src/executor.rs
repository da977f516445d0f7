//! Count execution.
//!
//! Records what a technician physically counted against a scheduled count.
//! Deliberately has no side effect on part stock: what was observed and
//! what gets applied are separate steps, so a miscount can be corrected or
//! rejected before it touches live inventory (that application step is
//! reconciliation).

use chrono::{DateTime, Utc};
use std::sync::Arc;

use fleetforge_core::TenantId;
use fleetforge_counts::{
    CancelCount, CycleCount, CycleCountCommand, CycleCountId, RecordCount, StartCount,
};

use crate::error::EngineError;
use crate::services::EngineServices;

/// Drives the count lifecycle: start, record, cancel.
#[derive(Clone)]
pub struct CountExecutor {
    services: Arc<EngineServices>,
}

impl CountExecutor {
    pub fn new(services: Arc<EngineServices>) -> Self {
        Self { services }
    }

    /// Move a scheduled count to `InProgress` (optional step).
    pub fn start(
        &self,
        tenant_id: TenantId,
        count_id: CycleCountId,
        occurred_at: DateTime<Utc>,
    ) -> Result<CycleCount, EngineError> {
        let command = CycleCountCommand::StartCount(StartCount {
            tenant_id,
            count_id,
            occurred_at,
        });
        self.services.dispatch_count(tenant_id, count_id, command)?;
        self.services.load_count(tenant_id, count_id)
    }

    /// Record the physical count result and complete the count.
    ///
    /// The variance (`actual − expected`) is computed inside the aggregate,
    /// exactly once. Returns the updated authoritative record.
    pub fn execute(
        &self,
        tenant_id: TenantId,
        count_id: CycleCountId,
        actual_quantity: i64,
        notes: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<CycleCount, EngineError> {
        let command = CycleCountCommand::RecordCount(RecordCount {
            tenant_id,
            count_id,
            actual_quantity,
            notes,
            occurred_at,
        });
        self.services.dispatch_count(tenant_id, count_id, command)?;
        self.services.load_count(tenant_id, count_id)
    }

    /// Cancel an open count. Never permitted once the count is completed.
    pub fn cancel(
        &self,
        tenant_id: TenantId,
        count_id: CycleCountId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<CycleCount, EngineError> {
        let command = CycleCountCommand::CancelCount(CancelCount {
            tenant_id,
            count_id,
            reason,
            occurred_at,
        });
        self.services.dispatch_count(tenant_id, count_id, command)?;
        self.services.load_count(tenant_id, count_id)
    }
}
