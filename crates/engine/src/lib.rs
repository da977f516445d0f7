//! `fleetforge-engine`
//!
//! The operational layer on top of the domain crates: ABC classification
//! runs, cycle count schedule generation, count execution, and
//! reconciliation of completed counts back into stock.
//!
//! Batch operations (classification, scheduling) read the projections and
//! tolerate their lag; interactive operations rehydrate aggregates from the
//! event store so callers read their own writes.

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod reconciler;
pub mod report;
pub mod scheduler;
pub mod services;

pub use classifier::AbcClassifier;
pub use config::{AbcThresholds, CountIntervals, EngineConfig};
pub use error::EngineError;
pub use executor::CountExecutor;
pub use jobs::{
    BatchRunPayload, enqueue_abc_recalculation, enqueue_schedule_generation,
    register_engine_handlers,
};
pub use reconciler::{ReconciliationEngine, ReconciliationOutcome};
pub use report::{ClassificationRun, RunFailure, ScheduleRun};
pub use scheduler::ScheduleGenerator;
pub use services::{EngineServices, build_in_memory_services};
