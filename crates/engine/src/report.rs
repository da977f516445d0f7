//! Typed run reports for the batch operations.

use serde::Serialize;

use fleetforge_parts::PartId;

/// One part that failed inside a batch run. The run keeps going; failures
/// are collected, never thrown.
#[derive(Debug, Clone, Serialize)]
pub struct RunFailure {
    pub part_id: PartId,
    pub error: String,
}

/// Outcome of one `AbcClassifier::recalculate` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassificationRun {
    /// Active parts considered.
    pub total: usize,
    /// Parts whose class actually changed.
    pub updated: usize,
    /// Parts with invalid cost/usage data, classified `C` instead of
    /// aborting the run.
    pub flagged: Vec<PartId>,
    pub failures: Vec<RunFailure>,
}

/// Outcome of one `ScheduleGenerator::generate_schedule` run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduleRun {
    /// Counts created.
    pub scheduled: usize,
    /// Parts skipped because a count is already open for them.
    pub skipped_open: usize,
    /// Parts skipped because their next due date is still in the future.
    pub skipped_not_due: usize,
    pub failures: Vec<RunFailure>,
}
