//! Queue persistence: claimable jobs plus the dead-letter queue.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;

use fleetforge_core::TenantId;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Storage contract the executor runs against.
///
/// At-least-once by construction: `claim_next` hands out a job and marks it
/// `Running`, but nothing stops a crashed worker from leaving it there.
/// `reap_stale` is the recovery path; handlers therefore have to tolerate
/// re-execution.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Persist the new state of a claimed job.
    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest ready job, atomically marking it `Running`.
    /// `tenant_id` narrows the claim to one tenant's queue.
    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError>;

    /// Time out claims stuck in `Running` longer than `older_than`.
    ///
    /// Each reaped job gets a failed attempt on its record (so the stuck
    /// duration is accounted) and either re-enters the queue under its retry
    /// policy or dead-letters. Returns the reaped ids.
    fn reap_stale(&self, older_than: Duration) -> Result<Vec<JobId>, JobStoreError>;

    /// Park a job in the dead-letter queue.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to the queue with a fresh attempt
    /// budget.
    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError>;

    /// Per-tenant queue counters.
    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(tenant_id)
    }

    fn reap_stale(&self, older_than: Duration) -> Result<Vec<JobId>, JobStoreError> {
        (**self).reap_stale(older_than)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(tenant_id, limit)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(tenant_id, job_id)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant_id)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("no such job: {0}")]
    NotFound(JobId),
    #[error("job belongs to another tenant")]
    TenantIsolation,
    #[error("job {0} is already queued")]
    AlreadyExists(JobId),
    #[error("store failure: {0}")]
    Storage(String),
}

/// Queue counters for one tenant. Dead letters are counted from the DLQ.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// Map-backed store for tests and single-node runs.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let id = job.id;
        match jobs.entry(id) {
            Entry::Occupied(_) => Err(JobStoreError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(job);
                Ok(id)
            }
        }
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let Some(job) = jobs.get(&job_id) else {
            return Ok(None);
        };
        if job.tenant_id != tenant_id {
            return Err(JobStoreError::TenantIsolation);
        }
        Ok(Some(job.clone()))
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let slot = jobs
            .get_mut(&job.id)
            .ok_or(JobStoreError::NotFound(job.id))?;
        *slot = job.clone();
        Ok(())
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();

        // Oldest ready job wins; the id tie-breaks same-instant creations.
        let next_id = jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. })
                    && j.is_ready()
                    && tenant_id.is_none_or(|t| j.tenant_id == t)
            })
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        let Some(job_id) = next_id else {
            return Ok(None);
        };

        let job = jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;
        job.mark_running();
        Ok(Some(job.clone()))
    }

    fn reap_stale(&self, older_than: Duration) -> Result<Vec<JobId>, JobStoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| JobStoreError::Storage(e.to_string()))?;

        let mut jobs = self.jobs.write().unwrap();
        let stale: Vec<JobId> = jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Running) && j.updated_at < cutoff)
            .map(|j| j.id)
            .collect();

        let mut parked = Vec::new();
        for id in &stale {
            if let Some(job) = jobs.get_mut(id) {
                // updated_at is the claim time, so the attempt record carries
                // the real stuck duration.
                let claimed_at = job.updated_at;
                job.mark_failed(format!("claim timed out after {older_than:?}"), claimed_at);
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    parked.push(*id);
                }
            }
        }

        let mut dls = self.dead_letters.write().unwrap();
        for id in parked {
            if let Some(job) = jobs.remove(&id) {
                let reason = "claim timed out, retries exhausted".to_string();
                dls.insert(id, DeadLetterEntry::new(job, reason));
            }
        }

        Ok(stale)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let mut dls = self.dead_letters.write().unwrap();

        job.updated_at = Utc::now();
        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().unwrap();
        let mut entries: Vec<_> = dls
            .values()
            .filter(|e| e.job.tenant_id == tenant_id)
            .cloned()
            .collect();

        entries.sort_by_key(|e| e.dead_lettered_at);
        entries.truncate(limit);
        Ok(entries)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let mut dls = self.dead_letters.write().unwrap();

        let entry = dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if entry.job.tenant_id != tenant_id {
            dls.insert(job_id, entry);
            return Err(JobStoreError::TenantIsolation);
        }

        let mut job = entry.job;
        job.history.clear();
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let dls = self.dead_letters.read().unwrap();

        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.tenant_id == tenant_id) {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }

        stats.dead_lettered += dls
            .values()
            .filter(|e| e.job.tenant_id == tenant_id)
            .count();

        Ok(stats)
    }
}
