//! Infrastructure layer: event store, command dispatch, read models, jobs.
//!
//! Everything in here is in-process and synchronous. The trait boundaries
//! (`EventStore`, `TenantStore`, `JobStore`) are where durable backends would
//! plug in; the in-memory implementations serve tests, benchmarks and
//! single-node deployments.

pub mod command_dispatcher;
pub mod event_store;
pub mod jobs;
pub mod projections;
pub mod read_model;

mod integration_tests;
