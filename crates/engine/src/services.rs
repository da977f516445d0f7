//! Engine service wiring.
//!
//! Bundles the dispatcher, the event store, and the three read models behind
//! one handle that the engine operations share. `build_in_memory_services`
//! also wires the bus → projection subscriber, so the full
//! command → event → read-model pipeline runs in-process.

use std::sync::Arc;
use std::thread;

use serde_json::Value as JsonValue;

use fleetforge_core::TenantId;
use fleetforge_counts::{CycleCount, CycleCountCommand, CycleCountId};
use fleetforge_events::{EventBus, EventEnvelope, InMemoryEventBus};
use fleetforge_infra::command_dispatcher::CommandDispatcher;
use fleetforge_infra::event_store::{InMemoryEventStore, StoredEvent};
use fleetforge_infra::projections::{
    AdjustmentLedgerProjection, AdjustmentRow, CountBoardProjection, CountBoardRow,
    PartCatalogProjection, PartCatalogRow,
};
use fleetforge_infra::read_model::InMemoryTenantStore;
use fleetforge_parts::{AdjustmentId, Part, PartCommand, PartId};

use crate::config::EngineConfig;
use crate::error::EngineError;

pub type EngineBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type EngineDispatcher = CommandDispatcher<Arc<InMemoryEventStore>, EngineBus>;
pub type CatalogProjection = PartCatalogProjection<Arc<InMemoryTenantStore<PartId, PartCatalogRow>>>;
pub type BoardProjection = CountBoardProjection<Arc<InMemoryTenantStore<PartId, CountBoardRow>>>;
pub type LedgerProjection =
    AdjustmentLedgerProjection<Arc<InMemoryTenantStore<AdjustmentId, AdjustmentRow>>>;

/// Shared handle for the engine operations.
///
/// The projections here are eventually consistent with the store: the
/// subscriber applies envelopes in the background. Anything that needs
/// read-your-write accuracy (expected-quantity snapshots, reconciliation
/// pre-checks) rehydrates from the stream via `load_part`/`load_count`
/// instead of reading a projection.
#[derive(Clone)]
pub struct EngineServices {
    pub dispatcher: Arc<EngineDispatcher>,
    pub event_store: Arc<InMemoryEventStore>,
    pub event_bus: EngineBus,
    pub catalog: Arc<CatalogProjection>,
    pub board: Arc<BoardProjection>,
    pub ledger: Arc<LedgerProjection>,
    pub config: EngineConfig,
}

impl EngineServices {
    /// Dispatch a command to a part stream.
    pub fn dispatch_part(
        &self,
        tenant_id: TenantId,
        part_id: PartId,
        command: PartCommand,
    ) -> Result<Vec<StoredEvent>, EngineError> {
        let stored = self.dispatcher.dispatch::<Part>(
            tenant_id,
            part_id.0,
            "parts.part",
            command,
            |_, id| Part::empty(PartId::new(id)),
        )?;
        Ok(stored)
    }

    /// Dispatch a command to a cycle-count stream.
    pub fn dispatch_count(
        &self,
        tenant_id: TenantId,
        count_id: CycleCountId,
        command: CycleCountCommand,
    ) -> Result<Vec<StoredEvent>, EngineError> {
        let stored = self.dispatcher.dispatch::<CycleCount>(
            tenant_id,
            count_id.0,
            "counts.count",
            command,
            |_, id| CycleCount::empty(CycleCountId::new(id)),
        )?;
        Ok(stored)
    }

    /// Rehydrate a part from its stream. `NotFound` when the stream is empty.
    pub fn load_part(&self, tenant_id: TenantId, part_id: PartId) -> Result<Part, EngineError> {
        let part = self
            .dispatcher
            .load(tenant_id, part_id.0, |_, id| Part::empty(PartId::new(id)))?;
        if !part.exists() {
            return Err(EngineError::NotFound);
        }
        Ok(part)
    }

    /// Rehydrate a cycle count from its stream. `NotFound` when the stream
    /// is empty.
    pub fn load_count(
        &self,
        tenant_id: TenantId,
        count_id: CycleCountId,
    ) -> Result<CycleCount, EngineError> {
        let count = self.dispatcher.load(tenant_id, count_id.0, |_, id| {
            CycleCount::empty(CycleCountId::new(id))
        })?;
        if !count.exists() {
            return Err(EngineError::NotFound);
        }
        Ok(count)
    }
}

/// Wire the in-memory pipeline: store + bus + dispatcher + projections, with
/// a background subscriber feeding the read models.
pub fn build_in_memory_services(config: EngineConfig) -> Arc<EngineServices> {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: EngineBus = Arc::new(InMemoryEventBus::new());

    let catalog: Arc<CatalogProjection> =
        Arc::new(PartCatalogProjection::new(Arc::new(InMemoryTenantStore::new())));
    let board: Arc<BoardProjection> =
        Arc::new(CountBoardProjection::new(Arc::new(InMemoryTenantStore::new())));
    let ledger: Arc<LedgerProjection> = Arc::new(AdjustmentLedgerProjection::new(Arc::new(
        InMemoryTenantStore::new(),
    )));

    // Background subscriber: bus -> projections. Exits when the bus drops.
    {
        let sub = bus.subscribe();
        let catalog = catalog.clone();
        let board = board.clone();
        let ledger = ledger.clone();
        thread::Builder::new()
            .name("engine-projections".to_string())
            .spawn(move || {
                loop {
                    match sub.recv() {
                        Ok(env) => {
                            let applied = match env.aggregate_type() {
                                "parts.part" => catalog
                                    .apply_envelope(&env)
                                    .map_err(|e| e.to_string())
                                    .and_then(|_| {
                                        ledger.apply_envelope(&env).map_err(|e| e.to_string())
                                    }),
                                "counts.count" => {
                                    board.apply_envelope(&env).map_err(|e| e.to_string())
                                }
                                _ => Ok(()),
                            };
                            if let Err(e) = applied {
                                tracing::warn!("read model refused an envelope: {e}");
                            }
                        }
                        Err(_) => break,
                    }
                }
            })
            .expect("failed to spawn projection thread");
    }

    let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));
    Arc::new(EngineServices {
        dispatcher,
        event_store: store,
        event_bus: bus,
        catalog,
        board,
        ledger,
        config,
    })
}
