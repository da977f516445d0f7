//! Cycle-count schedule generation.
//!
//! Walks the active parts of a tenant and schedules a count for every part
//! whose next due date has arrived, honoring the one-open-count-per-part
//! invariant via the count board. Safe to re-run for the same day: parts
//! with an open count are skipped, so an interrupted run resumes where it
//! stopped instead of double-scheduling. Each pass folds the events it
//! commits straight into the board, so the rerun guarantee holds even
//! before the bus subscriber catches up.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use fleetforge_core::{AggregateId, TenantId};
use fleetforge_counts::{CycleCountCommand, CycleCountId, ScheduleCount};
use fleetforge_infra::projections::PartCatalogRow;

use crate::error::EngineError;
use crate::report::{RunFailure, ScheduleRun};
use crate::services::EngineServices;

/// Creates due `CycleCount` records from ABC classes and count history.
#[derive(Clone)]
pub struct ScheduleGenerator {
    services: Arc<EngineServices>,
}

impl ScheduleGenerator {
    pub fn new(services: Arc<EngineServices>) -> Self {
        Self { services }
    }

    /// Run one schedule generation pass for `as_of`.
    ///
    /// Already-compliant parts (open count, or not yet due) are skipped
    /// silently; per-part dispatch failures are isolated into the report.
    pub fn generate_schedule(&self, tenant_id: TenantId, as_of: DateTime<Utc>) -> ScheduleRun {
        let today = as_of.date_naive();
        let intervals = self.services.config.intervals;

        let mut rows: Vec<PartCatalogRow> = self
            .services
            .catalog
            .list(tenant_id)
            .into_iter()
            .filter(|r| r.active)
            .collect();
        rows.sort_by(|a, b| a.part_number.cmp(&b.part_number));

        let mut run = ScheduleRun::default();

        for row in rows {
            if self.services.board.has_open_count(tenant_id, &row.part_id) {
                run.skipped_open += 1;
                continue;
            }

            // Anchor on the last completed count, else on part creation.
            let anchor = self
                .services
                .board
                .last_completed_on(tenant_id, &row.part_id)
                .unwrap_or_else(|| row.created_at.date_naive());
            // A next-due past the end of the calendar is never due.
            let due = anchor
                .checked_add_days(intervals.interval_for(row.abc_class))
                .is_some_and(|next_due| next_due <= today);
            if !due {
                run.skipped_not_due += 1;
                continue;
            }

            match self.schedule_one(tenant_id, &row, today, as_of) {
                Ok(()) => run.scheduled += 1,
                Err(e) => run.failures.push(RunFailure {
                    part_id: row.part_id,
                    error: e.to_string(),
                }),
            }
        }

        tracing::info!(
            tenant_id = %tenant_id,
            scheduled = run.scheduled,
            skipped_open = run.skipped_open,
            skipped_not_due = run.skipped_not_due,
            failures = run.failures.len(),
            "count schedule run finished"
        );
        run
    }

    fn schedule_one(
        &self,
        tenant_id: TenantId,
        row: &PartCatalogRow,
        today: NaiveDate,
        as_of: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        // Snapshot the expected quantity from the authoritative stream, not
        // the read model, so the variance baseline matches the stock at the
        // moment of scheduling.
        let part = self.services.load_part(tenant_id, row.part_id)?;

        let count_id = CycleCountId::new(AggregateId::new());
        let count_number = self.services.board.allocate_count_number(tenant_id);
        let command = CycleCountCommand::ScheduleCount(ScheduleCount {
            tenant_id,
            count_id,
            part_id: row.part_id,
            count_number,
            scheduled_for: today,
            expected_quantity: part.quantity_on_hand(),
            occurred_at: as_of,
        });
        let stored = self.services.dispatch_count(tenant_id, count_id, command)?;

        // The subscriber feeds the board with a lag. Fold the committed
        // events in here so the open count is visible to the rest of this
        // pass and to an immediate rerun; the cursor drops the redelivery
        // when the bus catches up.
        for event in &stored {
            self.services
                .board
                .apply_envelope(&event.to_envelope())
                .map_err(|e| EngineError::Infra(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::services::build_in_memory_services;
    use chrono::{Days, Utc};
    use fleetforge_counts::{CountStatus, RecordCount};
    use fleetforge_parts::{AbcClass, CreatePart, PartCommand, PartId, Reclassify};
    use std::thread;
    use std::time::Duration;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn wait_for_processing() {
        thread::sleep(Duration::from_millis(50));
    }

    fn create_part(
        services: &EngineServices,
        tenant_id: TenantId,
        part_number: &str,
        quantity: i64,
        created: DateTime<Utc>,
    ) -> PartId {
        let part_id = PartId::new(AggregateId::new());
        services
            .dispatch_part(
                tenant_id,
                part_id,
                PartCommand::CreatePart(CreatePart {
                    tenant_id,
                    part_id,
                    part_number: part_number.to_string(),
                    name: format!("Part {part_number}"),
                    initial_quantity: quantity,
                    unit_cost_cents: 1250,
                    occurred_at: created,
                }),
            )
            .unwrap();
        part_id
    }

    fn classify(services: &EngineServices, tenant_id: TenantId, part_id: PartId, class: AbcClass) {
        services
            .dispatch_part(
                tenant_id,
                part_id,
                PartCommand::Reclassify(Reclassify {
                    tenant_id,
                    part_id,
                    class,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
    }

    #[test]
    fn schedules_parts_whose_interval_elapsed() {
        let services = build_in_memory_services(EngineConfig::default());
        let tenant_id = test_tenant_id();
        let generator = ScheduleGenerator::new(services.clone());

        let created = Utc::now() - Days::new(31);
        let due_part = create_part(&services, tenant_id, "FLT-1001", 100, created);
        classify(&services, tenant_id, due_part, AbcClass::A);

        // Class C part created the same day: 180-day cadence, not due.
        let fresh_part = create_part(&services, tenant_id, "FLT-2001", 40, Utc::now());
        classify(&services, tenant_id, fresh_part, AbcClass::C);
        wait_for_processing();

        let run = generator.generate_schedule(tenant_id, Utc::now());
        assert_eq!(run.scheduled, 1);
        assert_eq!(run.skipped_open, 0);
        assert_eq!(run.skipped_not_due, 1);
        assert!(run.failures.is_empty());
        wait_for_processing();

        assert!(services.board.has_open_count(tenant_id, &due_part));
        assert!(!services.board.has_open_count(tenant_id, &fresh_part));
    }

    #[test]
    fn expected_quantity_snapshots_current_stock() {
        let services = build_in_memory_services(EngineConfig::default());
        let tenant_id = test_tenant_id();
        let generator = ScheduleGenerator::new(services.clone());

        let created = Utc::now() - Days::new(200);
        let part_id = create_part(&services, tenant_id, "FLT-1001", 73, created);
        wait_for_processing();

        let run = generator.generate_schedule(tenant_id, Utc::now());
        assert_eq!(run.scheduled, 1);
        wait_for_processing();

        let board_row = services.board.get(tenant_id, &part_id).unwrap();
        let count_id = board_row.open_count.unwrap();
        let count = services.load_count(tenant_id, count_id).unwrap();
        assert_eq!(count.expected_quantity(), 73);
        assert_eq!(count.status(), CountStatus::Scheduled);
        assert_eq!(count.scheduled_for(), Some(Utc::now().date_naive()));
    }

    #[test]
    fn same_day_rerun_schedules_nothing_new() {
        let services = build_in_memory_services(EngineConfig::default());
        let tenant_id = test_tenant_id();
        let generator = ScheduleGenerator::new(services.clone());

        let created = Utc::now() - Days::new(365);
        let part_id = create_part(&services, tenant_id, "FLT-1001", 100, created);
        wait_for_processing();

        let as_of = Utc::now();
        let first = generator.generate_schedule(tenant_id, as_of);
        assert_eq!(first.scheduled, 1);
        wait_for_processing();

        let second = generator.generate_schedule(tenant_id, as_of);
        assert_eq!(second.scheduled, 0);
        assert_eq!(second.skipped_open, 1);
        wait_for_processing();

        // Exactly one open count on the board.
        let open: Vec<_> = services
            .board
            .list(tenant_id)
            .into_iter()
            .filter(|row| row.open_count.is_some())
            .collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].part_id, part_id);
    }

    #[test]
    fn back_to_back_rerun_schedules_nothing_new() {
        // No settling pause between the two passes: the rerun must see the
        // count the first pass scheduled even though the subscriber has not
        // fed the board yet.
        for trial in 0..20 {
            let services = build_in_memory_services(EngineConfig::default());
            let tenant_id = test_tenant_id();
            let generator = ScheduleGenerator::new(services.clone());

            let created = Utc::now() - Days::new(365);
            create_part(&services, tenant_id, "FLT-1001", 50, created);
            // The catalog still needs to list the part.
            wait_for_processing();

            let as_of = Utc::now();
            let first = generator.generate_schedule(tenant_id, as_of);
            assert_eq!(first.scheduled, 1);

            let second = generator.generate_schedule(tenant_id, as_of);
            assert_eq!(second.scheduled, 0, "double-scheduled on trial {trial}");
            assert_eq!(second.skipped_open, 1);
        }
    }

    #[test]
    fn completed_count_anchors_the_next_due_date() {
        let services = build_in_memory_services(EngineConfig::default());
        let tenant_id = test_tenant_id();
        let generator = ScheduleGenerator::new(services.clone());

        // Created long ago, class A (30-day cadence), last counted 10 days
        // ago: not due yet.
        let created = Utc::now() - Days::new(400);
        let part_id = create_part(&services, tenant_id, "FLT-1001", 100, created);
        classify(&services, tenant_id, part_id, AbcClass::A);
        wait_for_processing();

        let counted_at = Utc::now() - Days::new(10);
        let run = generator.generate_schedule(tenant_id, counted_at);
        assert_eq!(run.scheduled, 1);
        wait_for_processing();

        let count_id = services
            .board
            .get(tenant_id, &part_id)
            .unwrap()
            .open_count
            .unwrap();
        services
            .dispatch_count(
                tenant_id,
                count_id,
                CycleCountCommand::RecordCount(RecordCount {
                    tenant_id,
                    count_id,
                    actual_quantity: 100,
                    notes: None,
                    occurred_at: counted_at,
                }),
            )
            .unwrap();
        wait_for_processing();

        let rerun = generator.generate_schedule(tenant_id, Utc::now());
        assert_eq!(rerun.scheduled, 0);
        assert_eq!(rerun.skipped_not_due, 1);
    }

    #[test]
    fn unclassified_parts_count_on_the_slow_cadence() {
        let services = build_in_memory_services(EngineConfig::default());
        let tenant_id = test_tenant_id();
        let generator = ScheduleGenerator::new(services.clone());

        // 100 days old and never classified: 180-day cadence, not due.
        let created = Utc::now() - Days::new(100);
        let part_id = create_part(&services, tenant_id, "FLT-1001", 10, created);
        wait_for_processing();

        let run = generator.generate_schedule(tenant_id, Utc::now());
        assert_eq!(run.scheduled, 0);
        assert_eq!(run.skipped_not_due, 1);
        assert!(!services.board.has_open_count(tenant_id, &part_id));
    }
}
