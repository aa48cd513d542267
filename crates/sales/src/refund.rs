//! Refund gateway seam.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use backoffice_core::OrderId;

use crate::order::Order;

/// What the payment provider needs to refund one order in full.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order_id: OrderId,
    pub order_no: String,
    pub refund_no: String,
    pub amount: Decimal,
    pub payment_method: Option<String>,
    pub payment_no: Option<String>,
}

impl RefundRequest {
    pub fn full(order: &Order, refund_no: impl Into<String>) -> Self {
        Self {
            order_id: order.id,
            order_no: order.no.clone(),
            refund_no: refund_no.into(),
            amount: order.total_amount,
            payment_method: order.payment_method.clone(),
            payment_no: order.payment_no.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_no: String,
    /// Provider-side reference, when the provider returns one.
    pub provider_reference: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefundError {
    /// The provider refused this refund; retrying will not help.
    #[error("refund rejected: {0}")]
    Rejected(String),

    /// The provider could not be reached; the refund may be retried.
    #[error("refund gateway unavailable: {0}")]
    Unavailable(String),
}

impl RefundError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RefundError::Unavailable(_))
    }
}

/// Outbound refund call to the payment provider.
#[async_trait]
pub trait RefundGateway: Send + Sync {
    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, RefundError>;
}
