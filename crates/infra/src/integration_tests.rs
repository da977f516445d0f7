//! Whole-pipeline tests: dispatch a command, let the bus carry the committed
//! envelopes to the projections, then assert against the read models.
//!
//! Exercises read-model convergence, tenant partitioning, settlement through
//! the adjustment ledger, and the optimistic-concurrency guard on the store.

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use std::sync::Arc;

    use fleetforge_core::{AggregateId, ExpectedVersion, TenantId};
    use fleetforge_counts::{
        CycleCount, CycleCountCommand, CycleCountId, RecordCount, ScheduleCount, StartCount,
    };
    use fleetforge_events::{EventBus, EventEnvelope, InMemoryEventBus};
    use fleetforge_parts::{
        AdjustmentId, ApplyCountAdjustment, ConsumeStock, CreatePart, Part, PartCommand, PartId,
        ReceiveStock,
    };

    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, UncommittedEvent};
    use crate::projections::{
        AdjustmentLedgerProjection, AdjustmentRow, CountBoardProjection, CountBoardRow,
        PartCatalogProjection, PartCatalogRow,
    };
    use crate::read_model::InMemoryTenantStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

    struct Pipeline {
        dispatcher: CommandDispatcher<Arc<InMemoryEventStore>, Bus>,
        store: Arc<InMemoryEventStore>,
        catalog: Arc<PartCatalogProjection<Arc<InMemoryTenantStore<PartId, PartCatalogRow>>>>,
        board: Arc<CountBoardProjection<Arc<InMemoryTenantStore<PartId, CountBoardRow>>>>,
        ledger:
            Arc<AdjustmentLedgerProjection<Arc<InMemoryTenantStore<AdjustmentId, AdjustmentRow>>>>,
    }

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_part_id() -> PartId {
        PartId::new(AggregateId::new())
    }

    fn setup() -> Pipeline {
        // Structured logs from the dispatcher and executor show up under
        // --nocapture; repeated init is a no-op.
        fleetforge_observability::init();

        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = CommandDispatcher::new(store.clone(), bus.clone());

        let catalog = Arc::new(PartCatalogProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let board = Arc::new(CountBoardProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));
        let ledger = Arc::new(AdjustmentLedgerProjection::new(Arc::new(
            InMemoryTenantStore::new(),
        )));

        // Subscribe to the bus BEFORE any events are published.
        let catalog_clone = catalog.clone();
        let board_clone = board.clone();
        let ledger_clone = ledger.clone();
        let bus_clone = bus.clone();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
        std::thread::spawn(move || {
            let sub = bus_clone.subscribe();
            let _ = ready_tx.send(());
            loop {
                match sub.recv() {
                    Ok(env) => {
                        // Route by stream type: part events feed the catalog and
                        // the ledger, count events feed the board.
                        let result = match env.aggregate_type() {
                            "parts.part" => catalog_clone
                                .apply_envelope(&env)
                                .map_err(|e| format!("{e:?}"))
                                .and_then(|_| {
                                    ledger_clone
                                        .apply_envelope(&env)
                                        .map_err(|e| format!("{e:?}"))
                                }),
                            "counts.count" => board_clone
                                .apply_envelope(&env)
                                .map_err(|e| format!("{e:?}")),
                            other => Err(format!("unexpected aggregate type: {other}")),
                        };
                        if let Err(e) = result {
                            eprintln!("Failed to apply envelope: {e}");
                        }
                    }
                    Err(_) => break,
                }
            }
        });
        // Hold the pipeline back until the subscriber loop is live, or the
        // first append could publish before anyone listens.
        let _ = ready_rx.recv_timeout(std::time::Duration::from_secs(1));

        Pipeline {
            dispatcher,
            store,
            catalog,
            board,
            ledger,
        }
    }

    /// Give the subscriber thread a beat to drain the bus.
    fn wait_for_processing() {
        std::thread::sleep(std::time::Duration::from_millis(50));
    }

    fn create_part(p: &Pipeline, tenant_id: TenantId, part_id: PartId, initial_quantity: i64) {
        let cmd = CreatePart {
            tenant_id,
            part_id,
            part_number: "FLT-1001".to_string(),
            name: "Oil filter".to_string(),
            initial_quantity,
            unit_cost_cents: 1250,
            occurred_at: Utc::now(),
        };
        p.dispatcher
            .dispatch(
                tenant_id,
                part_id.0,
                "parts.part",
                PartCommand::CreatePart(cmd),
                |_, id| Part::empty(PartId::new(id)),
            )
            .unwrap();
    }

    fn schedule_count(
        p: &Pipeline,
        tenant_id: TenantId,
        count_id: CycleCountId,
        part_id: PartId,
        expected_quantity: i64,
    ) {
        let cmd = ScheduleCount {
            tenant_id,
            count_id,
            part_id,
            count_number: p.board.allocate_count_number(tenant_id),
            scheduled_for: Utc::now().date_naive(),
            expected_quantity,
            occurred_at: Utc::now(),
        };
        p.dispatcher
            .dispatch(
                tenant_id,
                count_id.0,
                "counts.count",
                CycleCountCommand::ScheduleCount(cmd),
                |_, id| CycleCount::empty(CycleCountId::new(id)),
            )
            .unwrap();
    }

    #[test]
    fn create_part_populates_the_catalog() {
        let p = setup();
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();

        create_part(&p, tenant_id, part_id, 100);
        wait_for_processing();

        let row = p.catalog.get(tenant_id, &part_id).unwrap();
        assert_eq!(row.part_id, part_id);
        assert_eq!(row.part_number, "FLT-1001");
        assert_eq!(row.name, "Oil filter");
        assert_eq!(row.quantity_on_hand, 100);
        assert_eq!(row.unit_cost_cents, 1250);
        assert_eq!(row.usage_quantity, 0);
        assert_eq!(row.abc_class, None);
        assert!(row.active);
    }

    #[test]
    fn stock_movements_accumulate_in_the_catalog() {
        let p = setup();
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();

        create_part(&p, tenant_id, part_id, 100);
        wait_for_processing();

        for quantity in [25, 10] {
            let cmd = ReceiveStock {
                tenant_id,
                part_id,
                quantity,
                occurred_at: Utc::now(),
            };
            p.dispatcher
                .dispatch(
                    tenant_id,
                    part_id.0,
                    "parts.part",
                    PartCommand::ReceiveStock(cmd),
                    |_, id| Part::empty(PartId::new(id)),
                )
                .unwrap();
        }

        let consume = ConsumeStock {
            tenant_id,
            part_id,
            quantity: 15,
            occurred_at: Utc::now(),
        };
        p.dispatcher
            .dispatch(
                tenant_id,
                part_id.0,
                "parts.part",
                PartCommand::ConsumeStock(consume),
                |_, id| Part::empty(PartId::new(id)),
            )
            .unwrap();

        wait_for_processing();

        // 100 + 25 + 10 - 15
        let row = p.catalog.get(tenant_id, &part_id).unwrap();
        assert_eq!(row.quantity_on_hand, 120);
        assert_eq!(row.usage_quantity, 15);
    }

    #[test]
    fn scheduled_count_appears_open_then_completes() {
        let p = setup();
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let count_id = CycleCountId::new(AggregateId::new());

        create_part(&p, tenant_id, part_id, 40);
        schedule_count(&p, tenant_id, count_id, part_id, 40);
        wait_for_processing();

        assert!(p.board.has_open_count(tenant_id, &part_id));
        assert_eq!(p.board.last_completed_on(tenant_id, &part_id), None);

        let start = StartCount {
            tenant_id,
            count_id,
            occurred_at: Utc::now(),
        };
        p.dispatcher
            .dispatch(
                tenant_id,
                count_id.0,
                "counts.count",
                CycleCountCommand::StartCount(start),
                |_, id| CycleCount::empty(CycleCountId::new(id)),
            )
            .unwrap();

        let recorded_at = Utc::now();
        let record = RecordCount {
            tenant_id,
            count_id,
            actual_quantity: 38,
            notes: Some("two damaged".to_string()),
            occurred_at: recorded_at,
        };
        p.dispatcher
            .dispatch(
                tenant_id,
                count_id.0,
                "counts.count",
                CycleCountCommand::RecordCount(record),
                |_, id| CycleCount::empty(CycleCountId::new(id)),
            )
            .unwrap();

        wait_for_processing();

        assert!(!p.board.has_open_count(tenant_id, &part_id));
        assert_eq!(
            p.board.last_completed_on(tenant_id, &part_id),
            Some(recorded_at.date_naive())
        );
    }

    #[test]
    fn applied_adjustment_reaches_ledger_and_catalog() {
        let p = setup();
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let count_id = CycleCountId::new(AggregateId::new());
        let adjustment_id = AdjustmentId::new();

        create_part(&p, tenant_id, part_id, 100);

        let cmd = ApplyCountAdjustment {
            tenant_id,
            part_id,
            count_id: count_id.0,
            adjustment_id,
            delta: -3,
            occurred_at: Utc::now(),
        };
        p.dispatcher
            .dispatch(
                tenant_id,
                part_id.0,
                "parts.part",
                PartCommand::ApplyCountAdjustment(cmd),
                |_, id| Part::empty(PartId::new(id)),
            )
            .unwrap();

        wait_for_processing();

        let row = p.ledger.for_count(tenant_id, count_id.0).unwrap();
        assert_eq!(row.adjustment_id, adjustment_id);
        assert_eq!(row.delta, -3);
        assert_eq!(row.quantity_after, 97);

        let catalog_row = p.catalog.get(tenant_id, &part_id).unwrap();
        assert_eq!(catalog_row.quantity_on_hand, 97);
    }

    #[test]
    fn duplicate_adjustment_settles_nothing_further() {
        let p = setup();
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();
        let count_id = CycleCountId::new(AggregateId::new());

        create_part(&p, tenant_id, part_id, 100);

        let cmd = ApplyCountAdjustment {
            tenant_id,
            part_id,
            count_id: count_id.0,
            adjustment_id: AdjustmentId::new(),
            delta: -3,
            occurred_at: Utc::now(),
        };
        let first = p
            .dispatcher
            .dispatch(
                tenant_id,
                part_id.0,
                "parts.part",
                PartCommand::ApplyCountAdjustment(cmd.clone()),
                |_, id| Part::empty(PartId::new(id)),
            )
            .unwrap();
        assert_eq!(first.len(), 1);

        // Retry with a fresh adjustment id but the same count: the aggregate
        // decides nothing, so nothing is appended or published.
        let retry = ApplyCountAdjustment {
            adjustment_id: AdjustmentId::new(),
            ..cmd
        };
        let second = p
            .dispatcher
            .dispatch(
                tenant_id,
                part_id.0,
                "parts.part",
                PartCommand::ApplyCountAdjustment(retry),
                |_, id| Part::empty(PartId::new(id)),
            )
            .unwrap();
        assert!(second.is_empty());

        wait_for_processing();

        assert_eq!(p.ledger.list(tenant_id).len(), 1);
        assert_eq!(p.catalog.get(tenant_id, &part_id).unwrap().quantity_on_hand, 97);
    }

    #[test]
    fn tenants_only_see_their_own_rows() {
        let p = setup();
        let tenant1 = test_tenant_id();
        let tenant2 = test_tenant_id();
        let part1 = test_part_id();
        let part2 = test_part_id();

        create_part(&p, tenant1, part1, 10);
        create_part(&p, tenant2, part2, 20);
        wait_for_processing();

        let tenant1_rows = p.catalog.list(tenant1);
        assert_eq!(tenant1_rows.len(), 1);
        assert_eq!(tenant1_rows[0].part_id, part1);

        let tenant2_rows = p.catalog.list(tenant2);
        assert_eq!(tenant2_rows.len(), 1);
        assert_eq!(tenant2_rows[0].part_id, part2);

        assert!(p.catalog.get(tenant1, &part2).is_none());
        assert!(p.catalog.get(tenant2, &part1).is_none());
    }

    #[test]
    fn rejected_command_leaves_read_models_unchanged() {
        let p = setup();
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();

        create_part(&p, tenant_id, part_id, 3);
        wait_for_processing();

        let consume = ConsumeStock {
            tenant_id,
            part_id,
            quantity: 4,
            occurred_at: Utc::now(),
        };
        let result = p.dispatcher.dispatch(
            tenant_id,
            part_id.0,
            "parts.part",
            PartCommand::ConsumeStock(consume),
            |_, id| Part::empty(PartId::new(id)),
        );

        match result.unwrap_err() {
            DispatchError::Validation(_) => {}
            e => panic!("Expected Validation, got: {e:?}"),
        }

        wait_for_processing();

        let row = p.catalog.get(tenant_id, &part_id).unwrap();
        assert_eq!(row.quantity_on_hand, 3);
        assert_eq!(row.usage_quantity, 0);
    }

    #[test]
    fn count_numbers_stay_unique_per_tenant() {
        let p = setup();
        let tenant_id = test_tenant_id();

        let mut numbers = Vec::new();
        for _ in 0..4 {
            let part_id = test_part_id();
            let count_id = CycleCountId::new(AggregateId::new());
            create_part(&p, tenant_id, part_id, 10);
            schedule_count(&p, tenant_id, count_id, part_id, 10);
            numbers.push(p.board.allocate_count_number(tenant_id).sequence());
        }

        wait_for_processing();

        // Strictly increasing, so never reused.
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(p.board.list(tenant_id).len(), 4);
    }

    #[test]
    fn append_with_stale_version_is_rejected() {
        let p = setup();
        let tenant_id = test_tenant_id();
        let part_id = test_part_id();

        create_part(&p, tenant_id, part_id, 10);

        // A writer that loaded the stream before the create commits loses.
        let stale = UncommittedEvent::from_typed(
            tenant_id,
            part_id.0,
            "parts.part",
            uuid::Uuid::now_v7(),
            &fleetforge_parts::PartEvent::StockReceived(fleetforge_parts::StockReceived {
                tenant_id,
                part_id,
                quantity: 5,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        let result = p.store.append(vec![stale], ExpectedVersion::Exact(0));
        match result.unwrap_err() {
            EventStoreError::Concurrency(_) => {}
            e => panic!("Expected Concurrency, got: {e:?}"),
        }

        // The stream still holds only the creation event.
        let stream = p.store.load_stream(tenant_id, part_id.0).unwrap();
        assert_eq!(stream.len(), 1);
    }
}
