//! Subscriber construction and installation.
//!
//! JSON lines on stdout, filtered via `RUST_LOG` (default `info`). Batch run
//! summaries and job executor transitions arrive here as structured fields.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process, reading `RUST_LOG` for the filter.
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
