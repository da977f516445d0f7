//! Cycle-count domain module (event-sourced).
//!
//! A cycle count is a scheduled physical count of a single part. This crate
//! holds its state machine (`scheduled → in_progress → completed`, with
//! cancellation from the open states) and the variance bookkeeping, as
//! deterministic domain logic (no IO, no HTTP, no storage). Applying the
//! variance to stock lives in the parts domain; marking the count reconciled
//! lives here.

pub mod count;

pub use count::{
    CancelCount, CountCancelled, CountNumber, CountReconciled, CountRecorded, CountScheduled,
    CountStarted, CountStatus, CycleCount, CycleCountCommand, CycleCountEvent, CycleCountId,
    MarkReconciled, RecordCount, ScheduleCount, StartCount,
};
