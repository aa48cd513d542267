//! Job executor with retry and backoff logic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Handler for one job kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobResult;
}

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

impl ExecutorStats {
    fn record(&mut self, outcome: &Result<(), String>, status: &JobStatus) {
        self.jobs_processed += 1;
        match outcome {
            Ok(()) => self.jobs_succeeded += 1,
            Err(_) => {
                self.jobs_failed += 1;
                if matches!(status, JobStatus::DeadLettered { .. }) {
                    self.jobs_dead_lettered += 1;
                }
            }
        }
    }
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Stop polling and wait for the job in flight to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "job executor task panicked");
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Background job executor.
///
/// Polls a job store, runs claimed jobs through the handler registered for their
/// kind, and applies the job's retry policy; exhausted jobs are moved to the
/// dead-letter queue.
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for one job kind name; a later registration replaces it.
    pub fn register_handler(&mut self, kind: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    fn get_handler(&self, kind: &JobKind) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(kind.type_name())
    }

    /// Run one claimed job and persist its outcome.
    pub async fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let Some(handler) = self.get_handler(&job.kind).cloned() else {
            let error = format!("no handler for job kind: {}", job.kind.type_name());
            warn!(job_id = %job.id, error = %error, "no handler for job");
            self.fail(job, error.clone(), Utc::now()).await?;
            return Err(error);
        };

        let started = Utc::now();
        match handler.handle(job).await {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job).await.map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, "job completed");
                Ok(())
            }
            JobResult::Failure(error) => {
                self.fail(job, error.clone(), started).await?;
                Err(error)
            }
        }
    }

    async fn fail(&self, job: &mut Job, error: String, started: chrono::DateTime<Utc>) -> Result<(), String> {
        job.mark_failed(error.clone(), started);
        if matches!(job.status, JobStatus::DeadLettered { .. }) {
            warn!(job_id = %job.id, kind = job.kind.type_name(), error = %error, "job dead-lettered");
            self.store.dead_letter(job.clone(), error).await.map_err(|e| e.to_string())
        } else {
            self.store.update(job).await.map_err(|e| e.to_string())
        }
    }

    /// Claim and run jobs until none is due, or `max_jobs` have run.
    ///
    /// Jobs waiting on a retry backoff are not due and are left for a later poll.
    pub async fn drain(&self, max_jobs: usize) -> Result<ExecutorStats, JobStoreError> {
        let mut stats = ExecutorStats::default();
        while (stats.jobs_processed as usize) < max_jobs {
            let Some(mut job) = self.store.claim_next().await? else {
                break;
            };
            let outcome = self.execute_one(&mut job).await;
            stats.record(&outcome, &job.status);
        }
        Ok(stats)
    }

    /// Spawn the polling loop as a tokio task.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let join = tokio::spawn(executor_loop(self, config, shutdown_rx, stats.clone()));

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

async fn executor_loop(
    executor: JobExecutor,
    config: JobExecutorConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "job executor started");
    let start_time = Instant::now();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match executor.store.claim_next().await {
            Ok(Some(mut job)) => {
                debug!(executor = %config.name, job_id = %job.id, kind = job.kind.type_name(), "claimed job");

                let outcome = executor.execute_one(&mut job).await;
                if let Ok(mut s) = stats.lock() {
                    s.record(&outcome, &job.status);
                }
                if let Err(e) = outcome {
                    debug!(
                        executor = %config.name,
                        job_id = %job.id,
                        error = %e,
                        status = job.status.label(),
                        "job execution failed"
                    );
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                error!(executor = %config.name, error = %e, "failed to claim job");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.poll_interval) => {}
            _ = shutdown_rx.changed() => {}
        }
    }

    info!(executor = %config.name, "job executor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;

    /// Handler that always reports the same outcome.
    struct Always(JobResult);

    #[async_trait]
    impl JobHandler for Always {
        async fn handle(&self, _job: &Job) -> JobResult {
            self.0.clone()
        }
    }

    fn always(result: JobResult) -> Arc<dyn JobHandler> {
        Arc::new(Always(result))
    }

    fn setup() -> (Arc<InMemoryJobStore>, JobExecutor) {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(store.clone());
        (store, executor)
    }

    #[tokio::test]
    async fn execute_successful_job() {
        let (store, mut executor) = setup();
        executor.register_handler("test", always(JobResult::Success));

        store
            .enqueue(Job::new(JobKind::custom("test"), serde_json::json!({})))
            .await
            .unwrap();

        let mut claimed = store.claim_next().await.unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).await.is_ok());
        assert_eq!(claimed.status, JobStatus::Completed);
        assert_eq!(store.stats().await.unwrap().completed, 1);
    }

    #[tokio::test]
    async fn failing_job_is_retried_then_dead_lettered() {
        let (store, mut executor) = setup();
        executor.register_handler("test", always(JobResult::Failure("test error".to_string())));

        let job = Job::new(JobKind::custom("test"), serde_json::json!({})).with_retry_policy(RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        });
        store.enqueue(job).await.unwrap();

        let mut claimed = store.claim_next().await.unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).await.is_err());
        assert!(matches!(claimed.status, JobStatus::Failed { .. }));

        // Skip the backoff.
        claimed.scheduled_at = None;
        store.update(&claimed).await.unwrap();

        let mut claimed = store.claim_next().await.unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).await.is_err());
        assert!(matches!(claimed.status, JobStatus::DeadLettered { .. }));

        let dead = store.list_dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "test error");
    }

    #[tokio::test]
    async fn handlers_match_the_exact_kind_name() {
        let (store, mut executor) = setup();
        executor.register_handler("crowdfunding.refund_orders", always(JobResult::Success));

        store
            .enqueue(Job::new(JobKind::RefundCrowdfundingOrders, serde_json::json!({})))
            .await
            .unwrap();
        let mut claimed = store.claim_next().await.unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).await.is_ok());

        store
            .enqueue(Job::new(JobKind::custom("crowdfunding.other"), serde_json::json!({})))
            .await
            .unwrap();
        let mut claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(
            executor.execute_one(&mut claimed).await,
            Err("no handler for job kind: crowdfunding.other".to_string())
        );
    }

    #[tokio::test]
    async fn jobs_without_handler_fail() {
        let (store, executor) = setup();
        store
            .enqueue(
                Job::new(JobKind::custom("orphan"), serde_json::json!({}))
                    .with_retry_policy(RetryPolicy::fixed(1, Duration::from_secs(1))),
            )
            .await
            .unwrap();

        let stats = executor.drain(10).await.unwrap();
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(stats.jobs_dead_lettered, 1);
    }

    #[tokio::test]
    async fn drain_stops_at_jobs_waiting_on_backoff() {
        let (store, mut executor) = setup();
        executor.register_handler("flaky", always(JobResult::Failure("down".to_string())));
        executor.register_handler("ok", always(JobResult::Success));

        store.enqueue(Job::new(JobKind::custom("flaky"), serde_json::json!({}))).await.unwrap();
        store.enqueue(Job::new(JobKind::custom("ok"), serde_json::json!({}))).await.unwrap();

        let stats = executor.drain(100).await.unwrap();
        assert_eq!(stats.jobs_processed, 2);
        assert_eq!(stats.jobs_succeeded, 1);
        assert_eq!(store.stats().await.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn spawned_executor_processes_and_shuts_down() {
        let (store, mut executor) = setup();
        executor.register_handler("test", always(JobResult::Success));
        let handle = executor.spawn(JobExecutorConfig::default().with_poll_interval(Duration::from_millis(10)));

        store
            .enqueue(Job::new(JobKind::custom("test"), serde_json::json!({})))
            .await
            .unwrap();

        for _ in 0..200 {
            if handle.stats().jobs_succeeded == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.stats().jobs_succeeded, 1);
        handle.shutdown().await;
    }
}
