//! Shared tracing/logging setup for FleetForge processes.

/// Install the process-wide subscriber, honoring `RUST_LOG`.
///
/// Whoever gets here first wins; every later call is a no-op.
pub fn init() {
    tracing::init();
}

pub mod tracing;
