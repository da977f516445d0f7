//! Claims jobs from a store and runs them through registered handlers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use fleetforge_core::TenantId;

use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Handler signature for one job kind.
pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

/// Knobs for the polling loop.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Thread name, also attached to every log line.
    pub name: String,
    /// Restrict this executor to one tenant's queue.
    pub tenant_id: Option<TenantId>,
    /// Claims stuck in `Running` longer than this are reaped each cycle.
    pub claim_timeout: Duration,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "jobs-worker".to_string(),
            tenant_id: None,
            claim_timeout: Duration::from_secs(60),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Control handle for a spawned executor thread.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Stop after the in-flight job, then join the thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Snapshot of the loop's counters.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Counters the polling loop keeps while it runs.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Routes claimed jobs to handlers and folds the outcome back into the store.
///
/// One job runs at a time, so two batch runs for the same tenant never
/// overlap. Handlers must be idempotent: a job can be re-run after a crash
/// or a timed-out claim.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under a routing pattern.
    ///
    /// Patterns match against `JobKind::type_name()`: exact names first, then
    /// `"prefix.*"` category patterns, then a bare `"*"` catch-all.
    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind_pattern.into(), Box::new(handler));
    }

    fn get_handler(&self, kind: &JobKind) -> Option<&JobHandler> {
        let type_name = kind.type_name();
        if let Some(h) = self.handlers.get(type_name) {
            return Some(h);
        }

        // Category match, e.g. "engine.*" matches "engine.abc_recalculation".
        for (pattern, handler) in &self.handlers {
            if let Some(prefix) = pattern.strip_suffix(".*")
                && type_name.starts_with(prefix)
            {
                return Some(handler);
            }
        }

        self.handlers.get("*")
    }

    /// Run the polling loop on its own thread.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let loop_stats = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                executor_loop(self, config, shutdown_rx, loop_stats);
            })
            .expect("failed to spawn executor thread");

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Execute one already-claimed job: route to its handler, persist the
    /// outcome, dead-letter when retries are exhausted.
    ///
    /// Also usable directly for synchronous execution in tests.
    pub fn run_claimed(&self, job: &mut Job) -> Result<(), String> {
        let Some(handler) = self.get_handler(&job.kind) else {
            let error = format!("no route for job kind: {:?}", job.kind);
            warn!(job_id = %job.id, error = %error, "unroutable job");
            job.mark_failed(error.clone(), Utc::now());
            self.store.update(job).ok();
            return Err(error);
        };

        let started = Utc::now();

        match handler(job) {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job).map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, "job completed");
                Ok(())
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), started);
                self.store.update(job).map_err(|e| e.to_string())?;

                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, error = %error, "moved to dead letters");
                    self.store.dead_letter(job.clone(), error.clone()).ok();
                }

                Err(error)
            }
            JobResult::RetryNow => {
                job.mark_failed("handler requested immediate retry".to_string(), started);
                // The handler asked to skip the backoff mark_failed just set.
                job.scheduled_at = None;
                self.store.update(job).map_err(|e| e.to_string())?;
                Err("handler requested immediate retry".to_string())
            }
            JobResult::RetryAfter(delay) => {
                job.mark_failed("handler requested delayed retry".to_string(), started);
                job.scheduled_at =
                    Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
                self.store.update(job).map_err(|e| e.to_string())?;
                Err("handler requested delayed retry".to_string())
            }
        }
    }
}

fn executor_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "executor loop running");
    let started = Instant::now();

    loop {
        match shutdown_rx.try_recv() {
            // A dropped handle stops the loop too.
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        stats.lock().unwrap().uptime_secs = started.elapsed().as_secs();

        match executor.store.reap_stale(config.claim_timeout) {
            Ok(reaped) if !reaped.is_empty() => {
                warn!(executor = %config.name, count = reaped.len(), "reaped stale claims");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(executor = %config.name, error = ?e, "stale claim sweep failed");
            }
        }

        let mut job = match executor.store.claim_next(config.tenant_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                thread::sleep(config.poll_interval);
                continue;
            }
            Err(e) => {
                error!(executor = %config.name, error = ?e, "claim poll failed");
                thread::sleep(config.poll_interval);
                continue;
            }
        };

        debug!(
            executor = %config.name,
            job_id = %job.id,
            kind = ?job.kind,
            "job claimed"
        );

        let result = executor.run_claimed(&mut job);

        let mut s = stats.lock().unwrap();
        s.jobs_processed += 1;
        match result {
            Ok(()) => s.jobs_succeeded += 1,
            Err(error) => {
                s.jobs_failed += 1;
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    s.jobs_dead_lettered += 1;
                }
                debug!(
                    executor = %config.name,
                    job_id = %job.id,
                    error = %error,
                    status = ?job.status,
                    "job attempt failed"
                );
            }
        }
    }

    info!(executor = %config.name, "executor loop exited");
}
