//! Job storage abstraction and the in-memory store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::types::{DeadLetterEntry, Job, JobId, JobKind, JobStatus};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    async fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest claimable job, marking it running under a fresh lease.
    ///
    /// A job left `running` past its lease (its executor died) is claimable again.
    async fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    async fn list_by_kind(&self, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job out of the queue into the dead-letter queue.
    async fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to the queue as a fresh pending job.
    async fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    async fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError>;

    async fn stats(&self) -> Result<JobStats, JobStoreError>;
}

/// How long a claimed job stays leased to its executor.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl JobStats {
    pub(crate) fn count(&mut self, status: &JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed { .. } => self.failed += 1,
            JobStatus::DeadLettered { .. } => self.dead_lettered += 1,
        }
    }
}

/// In-memory job store for tests and database-less runs.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
    lease: Duration,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self {
            jobs: RwLock::default(),
            dead_letters: RwLock::default(),
            lease: DEFAULT_LEASE,
        }
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn jobs(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.write().map_err(|_| poisoned())
    }

    fn jobs_read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.read().map_err(|_| poisoned())
    }

    fn dead_letters(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobStoreError> {
        self.dead_letters.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.jobs_read()?.get(&job_id).cloned())
    }

    async fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs()?;
        match jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job.id)),
        }
    }

    async fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs()?;
        let now = Utc::now();

        let next = jobs
            .values()
            .filter(|j| j.is_claimable_at(now))
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next.and_then(|id| jobs.get_mut(&id)).map(|job| {
            job.mark_running(now, self.lease);
            job.clone()
        }))
    }

    async fn list_by_kind(&self, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs_read()?;
        let mut result: Vec<_> = jobs.values().filter(|j| &j.kind == kind).cloned().collect();
        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    async fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs()?;
        let mut dls = self.dead_letters()?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().map_err(|_| poisoned())?;
        let mut result: Vec<_> = dls.values().cloned().collect();
        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    async fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs()?;
        let mut dls = self.dead_letters()?;

        let entry = dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        let mut job = entry.job;
        job.reset_for_retry();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.dead_letters()?
            .remove(&job_id)
            .map(|_| ())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs_read()?;
        let dls = self.dead_letters.read().map_err(|_| poisoned())?;

        let mut stats = JobStats::default();
        for job in jobs.values() {
            stats.count(&job.status);
        }
        stats.dead_lettered += dls.len();
        Ok(stats)
    }
}

#[async_trait]
impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id).await
    }

    async fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job).await
    }

    async fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next().await
    }

    async fn list_by_kind(&self, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_kind(kind, limit).await
    }

    async fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason).await
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(limit).await
    }

    async fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id).await
    }

    async fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete_dead_letter(job_id).await
    }

    async fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(kind: &str) -> Job {
        Job::new(JobKind::custom(kind), serde_json::json!({}))
    }

    #[tokio::test]
    async fn enqueue_and_claim_in_fifo_order() {
        let store = InMemoryJobStore::new();
        let first = store.enqueue(job("a")).await.unwrap();
        let second = store.enqueue(job("b")).await.unwrap();

        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempt, 1);

        assert_eq!(store.claim_next().await.unwrap().unwrap().id, second);
        assert!(store.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn jobs_in_backoff_are_not_claimed_early() {
        let store = InMemoryJobStore::new();
        let mut later = job("later");
        later.scheduled_at = Some(Utc::now() + chrono::Duration::hours(1));
        store.enqueue(later).await.unwrap();
        assert!(store.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn running_job_stays_claimed_while_leased() {
        let store = InMemoryJobStore::new();
        store.enqueue(job("refund")).await.unwrap();

        store.claim_next().await.unwrap().unwrap();

        assert!(store.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn abandoned_job_is_reclaimed_after_its_lease() {
        // Zero lease: the first claim expires at once, as if its executor had died.
        let store = InMemoryJobStore::new().with_lease(Duration::ZERO);
        let id = store.enqueue(job("refund")).await.unwrap();

        let first = store.claim_next().await.unwrap().unwrap();
        let second = store.claim_next().await.unwrap().unwrap();

        assert_eq!(first.id, id);
        assert_eq!(second.id, id);
        assert_eq!(second.attempt, 2);
        assert_eq!(second.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn dead_letter_flow() {
        let store = InMemoryJobStore::new();
        let job_id = store.enqueue(job("test")).await.unwrap();

        let mut claimed = store.claim_next().await.unwrap().unwrap();
        claimed.mark_failed("test error".to_string(), Utc::now());
        store.dead_letter(claimed, "max retries exceeded".to_string()).await.unwrap();

        assert!(store.get(job_id).await.unwrap().is_none());
        let dls = store.list_dead_letters(10).await.unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].job.id, job_id);
        assert_eq!(dls[0].reason, "max retries exceeded");

        let retried = store.retry_dead_letter(job_id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert!(store.list_dead_letters(10).await.unwrap().is_empty());
        assert!(matches!(
            store.retry_dead_letter(job_id).await,
            Err(JobStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn dead_letters_can_be_discarded() {
        let store = InMemoryJobStore::new();
        let job = job("x");
        let id = job.id;
        store.enqueue(job.clone()).await.unwrap();
        store.dead_letter(job, "bad payload".to_string()).await.unwrap();

        store.delete_dead_letter(id).await.unwrap();
        assert!(matches!(store.delete_dead_letter(id).await, Err(JobStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn stats_tracking() {
        let store = InMemoryJobStore::new();
        for _ in 0..5 {
            store.enqueue(job("test")).await.unwrap();
        }
        assert_eq!(store.stats().await.unwrap().pending, 5);

        store.claim_next().await.unwrap();
        store.claim_next().await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.running, 2);
    }

    #[tokio::test]
    async fn list_by_kind_filters() {
        let store = InMemoryJobStore::new();
        store
            .enqueue(Job::new(JobKind::RefundCrowdfundingOrders, serde_json::json!({})))
            .await
            .unwrap();
        store.enqueue(job("other")).await.unwrap();

        let refunds = store.list_by_kind(&JobKind::RefundCrowdfundingOrders, 10).await.unwrap();
        assert_eq!(refunds.len(), 1);
    }
}
