//! Background job wiring for the periodic engine runs.
//!
//! The queue delivers at least once. Both batch runs are idempotent (a rerun
//! skips everything already settled), so a retry after a partial failure
//! converges instead of double-applying.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fleetforge_core::TenantId;
use fleetforge_infra::jobs::{Job, JobExecutor, JobId, JobKind, JobResult, JobStore, JobStoreError};

use crate::classifier::AbcClassifier;
use crate::scheduler::ScheduleGenerator;
use crate::services::EngineServices;

/// Payload shared by both periodic runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchRunPayload {
    /// Reference instant the run evaluates against.
    pub as_of: DateTime<Utc>,
}

/// Queue an ABC recalculation run for one tenant.
pub fn enqueue_abc_recalculation<S: JobStore>(
    store: &S,
    tenant_id: TenantId,
    as_of: DateTime<Utc>,
) -> Result<JobId, JobStoreError> {
    let payload = serde_json::to_value(BatchRunPayload { as_of })
        .map_err(|e| JobStoreError::Storage(e.to_string()))?;
    store.enqueue(Job::new(tenant_id, JobKind::AbcRecalculation, payload))
}

/// Queue a count schedule generation run for one tenant.
pub fn enqueue_schedule_generation<S: JobStore>(
    store: &S,
    tenant_id: TenantId,
    as_of: DateTime<Utc>,
) -> Result<JobId, JobStoreError> {
    let payload = serde_json::to_value(BatchRunPayload { as_of })
        .map_err(|e| JobStoreError::Storage(e.to_string()))?;
    store.enqueue(Job::new(tenant_id, JobKind::ScheduleGeneration, payload))
}

/// Register the engine's batch handlers on a job executor.
///
/// A run that hit per-part failures reports `Failure`, so the queue retries
/// the whole run under its backoff policy; parts that already settled are
/// skipped on the retry.
pub fn register_engine_handlers<S: JobStore + 'static>(
    executor: &mut JobExecutor<S>,
    services: Arc<EngineServices>,
) {
    let classifier = AbcClassifier::new(services.clone());
    executor.register_handler(JobKind::AbcRecalculation.type_name(), move |job| {
        let payload: BatchRunPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(e) => return JobResult::Failure(format!("invalid payload: {e}")),
        };
        let run = classifier.recalculate(job.tenant_id, payload.as_of);
        if run.failures.is_empty() {
            JobResult::Success
        } else {
            JobResult::Failure(format!(
                "{} of {} parts failed to reclassify",
                run.failures.len(),
                run.total
            ))
        }
    });

    let generator = ScheduleGenerator::new(services);
    executor.register_handler(JobKind::ScheduleGeneration.type_name(), move |job| {
        let payload: BatchRunPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(e) => return JobResult::Failure(format!("invalid payload: {e}")),
        };
        let run = generator.generate_schedule(job.tenant_id, payload.as_of);
        if run.failures.is_empty() {
            JobResult::Success
        } else {
            JobResult::Failure(format!("{} parts failed to schedule", run.failures.len()))
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::services::build_in_memory_services;
    use fleetforge_core::AggregateId;
    use fleetforge_infra::jobs::{InMemoryJobStore, JobStatus};
    use fleetforge_parts::{AbcClass, ConsumeStock, CreatePart, PartCommand, PartId};
    use std::thread;
    use std::time::Duration;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn wait_for_processing() {
        thread::sleep(Duration::from_millis(50));
    }

    fn create_part_with_usage(
        services: &EngineServices,
        tenant_id: TenantId,
        part_number: &str,
        consumed: i64,
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
                    initial_quantity: 500,
                    unit_cost_cents: 1000,
                    occurred_at: created,
                }),
            )
            .unwrap();
        if consumed > 0 {
            services
                .dispatch_part(
                    tenant_id,
                    part_id,
                    PartCommand::ConsumeStock(ConsumeStock {
                        tenant_id,
                        part_id,
                        quantity: consumed,
                        occurred_at: created,
                    }),
                )
                .unwrap();
        }
        part_id
    }

    #[test]
    fn recalculation_job_classifies_the_catalog() {
        let services = build_in_memory_services(EngineConfig::default());
        let tenant_id = test_tenant_id();
        let now = Utc::now();

        let top = create_part_with_usage(&services, tenant_id, "FLT-1", 100, now);
        create_part_with_usage(&services, tenant_id, "FLT-2", 50, now);
        create_part_with_usage(&services, tenant_id, "FLT-3", 10, now);
        create_part_with_usage(&services, tenant_id, "FLT-4", 1, now);
        wait_for_processing();

        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());
        register_engine_handlers(&mut executor, services.clone());

        enqueue_abc_recalculation(store.as_ref(), tenant_id, now).unwrap();

        let mut claimed = store.claim_next(Some(tenant_id)).unwrap().unwrap();
        executor.run_claimed(&mut claimed).unwrap();
        assert!(matches!(claimed.status, JobStatus::Completed));

        wait_for_processing();
        let row = services.catalog.get(tenant_id, &top).unwrap();
        assert_eq!(row.abc_class, Some(AbcClass::A));
    }

    #[test]
    fn schedule_job_opens_counts_for_due_parts() {
        let services = build_in_memory_services(EngineConfig::default());
        let tenant_id = test_tenant_id();
        let now = Utc::now();

        // Unclassified parts count on the 180-day cadence.
        let part_id = create_part_with_usage(
            &services,
            tenant_id,
            "FLT-1",
            0,
            now - chrono::Duration::days(200),
        );
        wait_for_processing();

        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());
        register_engine_handlers(&mut executor, services.clone());

        enqueue_schedule_generation(store.as_ref(), tenant_id, now).unwrap();

        let mut claimed = store.claim_next(Some(tenant_id)).unwrap().unwrap();
        executor.run_claimed(&mut claimed).unwrap();
        assert!(matches!(claimed.status, JobStatus::Completed));

        wait_for_processing();
        assert!(services.board.has_open_count(tenant_id, &part_id));
    }

    #[test]
    fn malformed_payload_fails_the_job() {
        let services = build_in_memory_services(EngineConfig::default());
        let tenant_id = test_tenant_id();

        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());
        register_engine_handlers(&mut executor, services);

        let job = Job::new(
            tenant_id,
            JobKind::AbcRecalculation,
            serde_json::json!({"bogus": true}),
        );
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next(Some(tenant_id)).unwrap().unwrap();
        let result = executor.run_claimed(&mut claimed);

        assert!(result.is_err());
        assert!(matches!(claimed.status, JobStatus::Failed { .. }));
    }
}
