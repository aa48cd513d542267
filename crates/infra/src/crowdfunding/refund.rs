//! Refunds for failed crowdfunding campaigns, run as background jobs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use backoffice_catalog::CrowdfundingStatus;
use backoffice_core::{DomainError, ProductId};
use backoffice_sales::{Order, RefundError, RefundGateway, RefundReceipt, RefundRequest};

use crate::jobs::{Job, JobHandler, JobId, JobKind, JobResult, RetryPolicy};
use crate::repository::{CrowdfundingRepository, OrderRepository, RepositoryError};

/// Payload of a `crowdfunding.refund_orders` job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOrdersPayload {
    pub product_id: ProductId,
}

impl RefundOrdersPayload {
    /// The job id is the campaign's product id, so a campaign has at most one refund job.
    pub fn into_job(self, policy: RetryPolicy) -> Job {
        let mut job = Job::new(JobKind::RefundCrowdfundingOrders, serde_json::json!(self)).with_retry_policy(policy);
        job.id = JobId::from_uuid(*self.product_id.as_uuid());
        job
    }

    pub fn from_job(job: &Job) -> Result<Self, serde_json::Error> {
        serde_json::from_value(job.payload.clone())
    }
}

#[derive(Debug, Error)]
pub enum RefundJobError {
    #[error("invalid refund job payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{pending} refund(s) left pending: {last}")]
    GatewayUnavailable { pending: usize, last: RefundError },
}

/// Per-run counts of the refund handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefundSummary {
    pub refunded: usize,
    pub rejected: usize,
}

/// Handler for `crowdfunding.refund_orders` jobs.
///
/// Orders already refunded are not returned by the repository, so a retried job
/// only touches what is still outstanding. A refund that was sent but not
/// confirmed reuses its refund number on the next attempt.
pub struct RefundOrdersHandler {
    campaigns: Arc<dyn CrowdfundingRepository>,
    orders: Arc<dyn OrderRepository>,
    gateway: Arc<dyn RefundGateway>,
}

impl RefundOrdersHandler {
    pub fn new(
        campaigns: Arc<dyn CrowdfundingRepository>,
        orders: Arc<dyn OrderRepository>,
        gateway: Arc<dyn RefundGateway>,
    ) -> Self {
        Self {
            campaigns,
            orders,
            gateway,
        }
    }

    pub async fn refund_campaign(&self, product_id: ProductId) -> Result<RefundSummary, RefundJobError> {
        let mut summary = RefundSummary::default();

        let campaign = self.campaigns.get(product_id).await?;
        if campaign.as_ref().map(|c| c.status) != Some(CrowdfundingStatus::Fail) {
            info!(%product_id, "campaign has not failed; nothing to refund");
            return Ok(summary);
        }

        let mut unavailable = None;
        let mut pending = 0;
        for order in self.orders.refundable_crowdfunding_orders(product_id).await? {
            match self.refund_order(order).await? {
                Ok(_) => summary.refunded += 1,
                Err(RefundError::Rejected(_)) => summary.rejected += 1,
                Err(e @ RefundError::Unavailable(_)) => {
                    pending += 1;
                    unavailable = Some(e);
                }
            }
        }

        if let Some(last) = unavailable {
            return Err(RefundJobError::GatewayUnavailable { pending, last });
        }

        info!(
            %product_id,
            refunded = summary.refunded,
            rejected = summary.rejected,
            "crowdfunding orders refunded"
        );
        Ok(summary)
    }

    /// Outer error: storage or state problems. Inner result: the gateway's answer.
    async fn refund_order(&self, mut order: Order) -> Result<Result<RefundReceipt, RefundError>, RefundJobError> {
        let refund_no = order.begin_refund(Utc::now())?.to_string();
        self.orders.update_refund(&order).await?;

        let request = RefundRequest::full(&order, refund_no);
        let outcome = self.gateway.refund(&request).await;
        match &outcome {
            Ok(_) => {
                order.complete_refund()?;
                self.orders.update_refund(&order).await?;
            }
            Err(RefundError::Rejected(reason)) => {
                warn!(order_no = %order.no, refund_no = %request.refund_no, %reason, "refund rejected");
                order.fail_refund(reason.clone())?;
                self.orders.update_refund(&order).await?;
            }
            Err(e @ RefundError::Unavailable(_)) => {
                warn!(order_no = %order.no, refund_no = %request.refund_no, error = %e, "refund gateway unavailable");
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl JobHandler for RefundOrdersHandler {
    async fn handle(&self, job: &Job) -> JobResult {
        let result = match RefundOrdersPayload::from_job(job) {
            Ok(payload) => self.refund_campaign(payload.product_id).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(_) => JobResult::Success,
            Err(e) => JobResult::Failure(e.to_string()),
        }
    }
}

/// Gateway that accepts every refund and only logs it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingRefundGateway;

#[async_trait]
impl RefundGateway for LoggingRefundGateway {
    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, RefundError> {
        info!(
            order_no = %request.order_no,
            refund_no = %request.refund_no,
            amount = %request.amount,
            payment_method = request.payment_method.as_deref().unwrap_or("-"),
            "refund accepted"
        );
        Ok(RefundReceipt {
            refund_no: request.refund_no.clone(),
            provider_reference: None,
        })
    }
}
