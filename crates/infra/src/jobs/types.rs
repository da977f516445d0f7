//! Job records, retry policy and execution outcomes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleetforge_core::TenantId;

/// Queue-wide unique job identifier (UUIDv7, so creation-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What a job does; the executor routes on [`JobKind::type_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Recompute ABC classes across a tenant's part catalog.
    AbcRecalculation,
    /// Open cycle counts for every part whose cadence is due.
    ScheduleGeneration,
    /// Anything else; routed by its kind string.
    Custom { kind: String },
}

impl JobKind {
    pub fn custom(kind: impl Into<String>) -> Self {
        Self::Custom { kind: kind.into() }
    }

    /// Routing key. Engine kinds live under the `engine.` prefix so one
    /// category handler can cover both batch runs.
    pub fn type_name(&self) -> &str {
        match self {
            JobKind::AbcRecalculation => "engine.abc_recalculation",
            JobKind::ScheduleGeneration => "engine.schedule_generation",
            JobKind::Custom { kind } => kind,
        }
    }
}

/// Where a job currently sits in its lifecycle.
///
/// `Failed` is claimable again once its backoff expires; `Completed` and
/// `DeadLettered` are final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed { error: String, attempt: u32 },
    DeadLettered { error: String, attempts: u32 },
}

/// How retry delays grow between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time.
    Fixed,
    /// `base * 2^(attempt-1)`, capped at `max_delay`.
    Exponential,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Retry behaviour attached to each job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt; 0 means fail once, dead-letter.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Fraction of the delay used as a +/- spread, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Constant-delay policy with no jitter. Deterministic, which is what
    /// tests and strictly periodic maintenance jobs want.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    /// Delay before retrying `attempt` (1-based; attempt 0 never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let cap = self.max_delay.as_millis() as f64;
        let nominal = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay.as_millis() as f64,
            BackoffStrategy::Exponential => {
                (self.base_delay.as_millis() as f64 * 2_f64.powi(attempt as i32 - 1)).min(cap)
            }
        };

        // Deterministic pseudo-jitter keyed on the attempt number: repeatable
        // in tests, still spreads retries across the jitter window.
        let spread = if self.jitter > 0.0 {
            let phase = ((f64::from(attempt) * 17.0) % 100.0) / 100.0;
            nominal * self.jitter * (phase - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((nominal + spread).max(0.0) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// One queued unit of background work.
///
/// The record carries everything the executor needs to run, retry and audit
/// it; the payload shape is the handler's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far; 0 until first claimed.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest time the job may run; `None` means immediately. Set by the
    /// backoff when an attempt fails.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// One record per finished attempt, including timed-out claims.
    pub history: Vec<JobAttemptRecord>,
}

/// Audit row for a single attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl Job {
    pub fn new(tenant_id: TenantId, kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id,
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Whether the job may be claimed now (its backoff, if any, expired).
    pub fn is_ready(&self) -> bool {
        self.scheduled_at.is_none_or(|at| Utc::now() >= at)
    }

    /// Transition to `Running` and open a new attempt.
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    /// Close the current attempt as a success.
    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.record_attempt(started_at, now, None);
    }

    /// Close the current attempt as a failure. Schedules the next attempt
    /// with backoff while the policy allows it, then dead-letters.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.updated_at = now;
        self.record_attempt(started_at, now, Some(error.clone()));

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }

    fn record_attempt(
        &mut self,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: Option<String>,
    ) {
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at,
            success: error.is_none(),
            error,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        });
    }
}

/// What a handler reports back to the executor.
#[derive(Debug)]
pub enum JobResult {
    Success,
    Failure(String),
    /// Transient condition; retry without waiting out the backoff.
    RetryNow,
    /// Retry, but not before the given delay.
    RetryAfter(Duration),
}

/// A job parked in the dead-letter queue, kept for inspection and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            reason,
            dead_lettered_at: Utc::now(),
        }
    }
}
