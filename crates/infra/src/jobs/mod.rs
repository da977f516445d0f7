//! Background job queue driving the periodic engine runs.
//!
//! The pieces: [`Job`] records in a [`JobStore`], a [`JobExecutor`] that
//! claims and runs them through registered handlers, [`RetryPolicy`]-driven
//! backoff, stale-claim reaping, and a dead-letter queue for jobs that burn
//! through their attempt budget. Everything is tenant-scoped; an executor can
//! be pinned to one tenant's queue.
//!
//! Delivery is at-least-once (a crashed worker's claim is reaped and the job
//! re-runs), which is safe because both engine batch runs are idempotent.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus, RetryPolicy,
};
