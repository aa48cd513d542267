//! Batch finalization of crowdfunding campaigns past their deadline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use backoffice_catalog::{CrowdfundingProduct, CrowdfundingStatus, Finalization, finalize};
use backoffice_core::ProductId;

use crate::crowdfunding::refund::RefundOrdersPayload;
use crate::jobs::{JobStore, JobStoreError, RetryPolicy};
use crate::repository::{CrowdfundingRepository, RepositoryError};

/// Counters for one finalizer pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinalizeReport {
    /// Campaigns returned by the due query.
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Campaigns another run finalized first (lost compare-and-set).
    pub skipped: usize,
    /// Refund jobs added to the queue, including retries for earlier failed campaigns.
    pub refunds_enqueued: usize,
    /// Status updates or refund enqueues that errored.
    pub errors: usize,
}

pub struct CrowdfundingFinalizer {
    campaigns: Arc<dyn CrowdfundingRepository>,
    jobs: Arc<dyn JobStore>,
    refund_policy: RetryPolicy,
}

impl CrowdfundingFinalizer {
    pub fn new(campaigns: Arc<dyn CrowdfundingRepository>, jobs: Arc<dyn JobStore>) -> Self {
        Self {
            campaigns,
            jobs,
            refund_policy: RetryPolicy::default(),
        }
    }

    /// Retry policy attached to the refund jobs this finalizer enqueues.
    pub fn with_refund_policy(mut self, policy: RetryPolicy) -> Self {
        self.refund_policy = policy;
        self
    }

    /// Finalize every campaign due at `now`.
    ///
    /// Failed campaigns whose refund job never made it into the queue (an earlier
    /// enqueue errored) are queued first. Only the due query can fail the pass;
    /// per-campaign errors are logged and counted in the report.
    #[instrument(skip(self), err)]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<FinalizeReport, RepositoryError> {
        let mut report = FinalizeReport::default();

        match self.campaigns.awaiting_refund_job().await {
            Ok(pending) => {
                for product_id in pending {
                    self.queue_refund(product_id, now, &mut report).await;
                }
            }
            Err(e) => {
                error!(error = %e, "failed to list campaigns awaiting refund");
                report.errors += 1;
            }
        }

        let due = self.campaigns.due_for_finalization(now).await?;
        report.due = due.len();

        for campaign in &due {
            self.finalize_one(campaign, now, &mut report).await;
        }

        if report.due > 0 || report.refunds_enqueued > 0 || report.errors > 0 {
            info!(
                due = report.due,
                succeeded = report.succeeded,
                failed = report.failed,
                skipped = report.skipped,
                refunds_enqueued = report.refunds_enqueued,
                errors = report.errors,
                "crowdfunding finalizer pass finished"
            );
        }
        Ok(report)
    }

    async fn finalize_one(&self, campaign: &CrowdfundingProduct, now: DateTime<Utc>, report: &mut FinalizeReport) {
        let product_id = campaign.product_id;
        let Some(outcome) = finalize(campaign, now) else {
            report.skipped += 1;
            return;
        };

        match self
            .campaigns
            .transition_status(product_id, CrowdfundingStatus::Funding, outcome.status(), now)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(%product_id, "campaign already finalized elsewhere");
                report.skipped += 1;
                return;
            }
            Err(e) => {
                error!(%product_id, error = %e, "failed to update campaign status");
                report.errors += 1;
                return;
            }
        }

        info!(
            %product_id,
            status = %outcome.status(),
            total_amount = %campaign.total_amount,
            target_amount = %campaign.target_amount,
            "campaign finalized"
        );

        match outcome {
            Finalization::Succeeded => report.succeeded += 1,
            Finalization::Failed => {
                report.failed += 1;
                self.queue_refund(product_id, now, report).await;
            }
        }
    }

    /// Enqueue the refund job of a failed campaign, then record it as queued.
    ///
    /// Left unrecorded on error, so the next pass tries again.
    async fn queue_refund(&self, product_id: ProductId, now: DateTime<Utc>, report: &mut FinalizeReport) {
        let job = RefundOrdersPayload { product_id }.into_job(self.refund_policy.clone());
        match self.jobs.enqueue(job).await {
            Ok(job_id) => {
                debug!(%product_id, %job_id, "refund job enqueued");
                report.refunds_enqueued += 1;
            }
            Err(JobStoreError::AlreadyExists(job_id)) => {
                debug!(%product_id, %job_id, "refund job already queued");
            }
            Err(e) => {
                error!(%product_id, error = %e, "failed to enqueue refund job");
                report.errors += 1;
                return;
            }
        }

        if let Err(e) = self.campaigns.mark_refund_queued(product_id, now).await {
            error!(%product_id, error = %e, "failed to record queued refund job");
            report.errors += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backoffice_core::ProductId;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    use crate::jobs::{
        DeadLetterEntry, InMemoryJobStore, Job, JobId, JobKind, JobStats, JobStoreError,
    };
    use crate::repository::{InMemoryStore, ProductRepository};
    use crate::testing;

    struct Fixture {
        store: Arc<InMemoryStore>,
        jobs: Arc<InMemoryJobStore>,
        finalizer: CrowdfundingFinalizer,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let jobs = InMemoryJobStore::arc();
        let finalizer = CrowdfundingFinalizer::new(store.clone(), jobs.clone());
        Fixture { store, jobs, finalizer }
    }

    async fn seed(store: &InMemoryStore, target: rust_decimal::Decimal, total: rust_decimal::Decimal, end_at: DateTime<Utc>) -> ProductId {
        let product = testing::crowdfunding_product(target, total, end_at, Utc::now());
        store.save(&testing::changes(&product)).await.unwrap();
        product.id
    }

    async fn status(store: &InMemoryStore, id: ProductId) -> CrowdfundingStatus {
        CrowdfundingRepository::get(store, id).await.unwrap().unwrap().status
    }

    async fn refund_jobs(jobs: &InMemoryJobStore) -> Vec<Job> {
        jobs.list_by_kind(&JobKind::RefundCrowdfundingOrders, 100).await.unwrap()
    }

    #[tokio::test]
    async fn reached_target_succeeds_without_refund() {
        let f = fixture();
        let now = Utc::now();
        let id = seed(&f.store, dec!(10000), dec!(12000), now - Duration::days(1)).await;

        let report = f.finalizer.run(now).await.unwrap();

        assert_eq!(status(&f.store, id).await, CrowdfundingStatus::Success);
        assert_eq!(report.succeeded, 1);
        assert!(refund_jobs(&f.jobs).await.is_empty());
    }

    #[tokio::test]
    async fn missed_target_fails_and_enqueues_one_refund() {
        let f = fixture();
        let now = Utc::now();
        let id = seed(&f.store, dec!(10000), dec!(4000), now - Duration::days(1)).await;

        let report = f.finalizer.run(now).await.unwrap();

        assert_eq!(status(&f.store, id).await, CrowdfundingStatus::Fail);
        assert_eq!(report.failed, 1);
        assert_eq!(report.refunds_enqueued, 1);
        let jobs = refund_jobs(&f.jobs).await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(RefundOrdersPayload::from_job(&jobs[0]).unwrap().product_id, id);
    }

    #[tokio::test]
    async fn campaigns_before_their_deadline_are_untouched() {
        let f = fixture();
        let now = Utc::now();
        let id = seed(&f.store, dec!(10), dec!(1000), now + Duration::minutes(1)).await;

        let report = f.finalizer.run(now).await.unwrap();

        assert_eq!(report, FinalizeReport::default());
        assert_eq!(status(&f.store, id).await, CrowdfundingStatus::Funding);
    }

    #[tokio::test]
    async fn running_twice_changes_nothing_more() {
        let f = fixture();
        let now = Utc::now();
        seed(&f.store, dec!(10000), dec!(4000), now - Duration::days(1)).await;
        seed(&f.store, dec!(10000), dec!(12000), now - Duration::days(1)).await;

        f.finalizer.run(now).await.unwrap();
        let second = f.finalizer.run(now + Duration::minutes(1)).await.unwrap();

        assert_eq!(second.due, 0);
        assert_eq!(refund_jobs(&f.jobs).await.len(), 1);
    }

    #[tokio::test]
    async fn refund_jobs_carry_the_configured_policy() {
        let store = Arc::new(InMemoryStore::new());
        let jobs = InMemoryJobStore::arc();
        let policy = RetryPolicy::fixed(3, std::time::Duration::from_secs(5));
        let finalizer = CrowdfundingFinalizer::new(store.clone(), jobs.clone()).with_refund_policy(policy.clone());
        let now = Utc::now();
        seed(&store, dec!(100), dec!(0), now).await;

        finalizer.run(now).await.unwrap();

        assert_eq!(refund_jobs(&jobs).await[0].retry_policy, policy);
    }

    /// Job store whose enqueue fails for the first call only.
    struct FlakyEnqueue {
        inner: InMemoryJobStore,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl JobStore for FlakyEnqueue {
        async fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err(JobStoreError::Storage("queue offline".to_string()));
            }
            self.inner.enqueue(job).await
        }
        async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
            self.inner.get(job_id).await
        }
        async fn update(&self, job: &Job) -> Result<(), JobStoreError> {
            self.inner.update(job).await
        }
        async fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
            self.inner.claim_next().await
        }
        async fn list_by_kind(&self, kind: &JobKind, limit: usize) -> Result<Vec<Job>, JobStoreError> {
            self.inner.list_by_kind(kind, limit).await
        }
        async fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
            self.inner.dead_letter(job, reason).await
        }
        async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
            self.inner.list_dead_letters(limit).await
        }
        async fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
            self.inner.retry_dead_letter(job_id).await
        }
        async fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
            self.inner.delete_dead_letter(job_id).await
        }
        async fn stats(&self) -> Result<JobStats, JobStoreError> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn enqueue_failure_does_not_stop_other_campaigns() {
        let store = Arc::new(InMemoryStore::new());
        let jobs = Arc::new(FlakyEnqueue {
            inner: InMemoryJobStore::new(),
            calls: Default::default(),
        });
        let finalizer = CrowdfundingFinalizer::new(store.clone(), jobs.clone());
        let now = Utc::now();
        let first = seed(&store, dec!(100), dec!(0), now - Duration::hours(2)).await;
        let second = seed(&store, dec!(100), dec!(0), now - Duration::hours(1)).await;

        let report = finalizer.run(now).await.unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.errors, 1);
        assert_eq!(report.refunds_enqueued, 1);
        assert_eq!(status(&store, first).await, CrowdfundingStatus::Fail);
        assert_eq!(status(&store, second).await, CrowdfundingStatus::Fail);
        let queued = jobs.list_by_kind(&JobKind::RefundCrowdfundingOrders, 10).await.unwrap();
        assert_eq!(RefundOrdersPayload::from_job(&queued[0]).unwrap().product_id, second);
    }

    #[tokio::test]
    async fn refund_missed_by_a_failed_enqueue_is_queued_on_the_next_pass() {
        let store = Arc::new(InMemoryStore::new());
        let jobs = Arc::new(FlakyEnqueue {
            inner: InMemoryJobStore::new(),
            calls: Default::default(),
        });
        let finalizer = CrowdfundingFinalizer::new(store.clone(), jobs.clone());
        let now = Utc::now();
        let id = seed(&store, dec!(100), dec!(0), now - Duration::hours(1)).await;

        let first = finalizer.run(now).await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.errors, 1);
        assert_eq!(first.refunds_enqueued, 0);
        assert_eq!(status(&store, id).await, CrowdfundingStatus::Fail);

        let second = finalizer.run(now + Duration::minutes(1)).await.unwrap();
        assert_eq!(second.due, 0);
        assert_eq!(second.errors, 0);
        assert_eq!(second.refunds_enqueued, 1);

        let third = finalizer.run(now + Duration::minutes(2)).await.unwrap();
        assert_eq!(third, FinalizeReport::default());

        let queued = jobs.list_by_kind(&JobKind::RefundCrowdfundingOrders, 10).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(RefundOrdersPayload::from_job(&queued[0]).unwrap().product_id, id);
    }

    #[tokio::test]
    async fn already_queued_refund_is_recorded_without_a_duplicate() {
        let f = fixture();
        let now = Utc::now();
        let id = seed(&f.store, dec!(100), dec!(0), now - Duration::hours(1)).await;
        f.store
            .transition_status(id, CrowdfundingStatus::Funding, CrowdfundingStatus::Fail, now)
            .await
            .unwrap();
        f.jobs
            .enqueue(RefundOrdersPayload { product_id: id }.into_job(RetryPolicy::default()))
            .await
            .unwrap();

        let report = f.finalizer.run(now).await.unwrap();

        assert_eq!(report.refunds_enqueued, 0);
        assert_eq!(report.errors, 0);
        assert_eq!(refund_jobs(&f.jobs).await.len(), 1);
        assert!(f.store.awaiting_refund_job().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deadline_extended_after_the_due_query_is_not_finalized() {
        let f = fixture();
        let now = Utc::now();
        let mut product = testing::crowdfunding_product(dec!(100), dec!(0), now - Duration::hours(1), now);
        f.store.save(&testing::changes(&product)).await.unwrap();
        let stale = f.store.due_for_finalization(now).await.unwrap().remove(0);

        // An admin pushes the deadline out before the finalizer writes.
        if let Some(c) = product.crowdfunding.as_mut() {
            c.end_at = now + Duration::days(7);
        }
        f.store.save(&testing::changes(&product)).await.unwrap();

        let mut report = FinalizeReport::default();
        f.finalizer.finalize_one(&stale, now, &mut report).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(status(&f.store, product.id).await, CrowdfundingStatus::Funding);
        assert!(refund_jobs(&f.jobs).await.is_empty());
    }
}
