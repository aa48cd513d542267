use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use backoffice_core::{DomainError, DomainResult, Entity, OrderId, ProductId, SkuId, UserId};

/// Order type discriminator.
///
/// Older rows predate the column and read as `normal`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Normal,
    Crowdfunding,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Normal => "normal",
            OrderType::Crowdfunding => "crowdfunding",
        }
    }
}

impl core::str::FromStr for OrderType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(OrderType::Normal),
            "crowdfunding" => Ok(OrderType::Crowdfunding),
            other => Err(DomainError::validation(format!("unknown order type: {other}"))),
        }
    }
}

/// Refund lifecycle of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    /// No refund requested.
    #[default]
    Pending,
    /// Buyer asked for a refund; awaiting review.
    Applied,
    /// Sent to the payment provider.
    Processing,
    Success,
    Failed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Applied => "applied",
            RefundStatus::Processing => "processing",
            RefundStatus::Success => "success",
            RefundStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RefundStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RefundStatus::Pending),
            "applied" => Ok(RefundStatus::Applied),
            "processing" => Ok(RefundStatus::Processing),
            "success" => Ok(RefundStatus::Success),
            "failed" => Ok(RefundStatus::Failed),
            other => Err(DomainError::validation(format!("unknown refund status: {other}"))),
        }
    }
}

/// Order line: one SKU of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub sku_id: SkuId,
    pub amount: u32,
    /// Unit price at the time of purchase.
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub no: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub payment_no: Option<String>,
    pub refund_status: RefundStatus,
    pub refund_no: Option<String>,
    /// Provider message of the last rejected refund.
    pub refund_reason: Option<String>,
    pub closed: bool,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn is_paid(&self) -> bool {
        self.paid_at.is_some()
    }

    pub fn contains_product(&self, product_id: ProductId) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }

    /// Paid and not yet refunded.
    pub fn is_refundable(&self) -> bool {
        self.is_paid() && self.refund_status != RefundStatus::Success
    }

    /// Move to `processing` before calling the payment provider.
    ///
    /// The first attempt assigns `refund_no`; retries reuse it so the provider can
    /// deduplicate.
    pub fn begin_refund(&mut self, now: DateTime<Utc>) -> DomainResult<&str> {
        if !self.is_paid() {
            return Err(DomainError::invariant(format!("order {} is not paid", self.no)));
        }
        if self.refund_status == RefundStatus::Success {
            return Err(DomainError::conflict(format!("order {} is already refunded", self.no)));
        }

        self.refund_status = RefundStatus::Processing;
        self.refund_reason = None;
        Ok(self.refund_no.get_or_insert_with(|| new_refund_no(now)).as_str())
    }

    pub fn complete_refund(&mut self) -> DomainResult<()> {
        self.ensure_processing()?;
        self.refund_status = RefundStatus::Success;
        Ok(())
    }

    pub fn fail_refund(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.ensure_processing()?;
        self.refund_status = RefundStatus::Failed;
        self.refund_reason = Some(reason.into());
        Ok(())
    }

    fn ensure_processing(&self) -> DomainResult<()> {
        if self.refund_status != RefundStatus::Processing {
            return Err(DomainError::invariant(format!(
                "order {} refund is '{}', expected 'processing'",
                self.no, self.refund_status
            )));
        }
        Ok(())
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Refund number: timestamp prefix plus the random tail of a UUIDv7.
pub fn new_refund_no(now: DateTime<Utc>) -> String {
    let hex = Uuid::now_v7().simple().to_string();
    format!("{}{}", now.format("%Y%m%d%H%M%S"), &hex[hex.len() - 12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn paid_order(product_id: ProductId) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            no: "20261019000001".to_string(),
            order_type: OrderType::Crowdfunding,
            user_id: UserId::new(),
            items: vec![OrderItem {
                product_id,
                sku_id: SkuId::new(),
                amount: 2,
                price: dec!(99.00),
            }],
            total_amount: dec!(198.00),
            paid_at: Some(now),
            payment_method: Some("alipay".to_string()),
            payment_no: Some("PAY-1".to_string()),
            refund_status: RefundStatus::Pending,
            refund_no: None,
            refund_reason: None,
            closed: false,
            created_at: now,
        }
    }

    #[test]
    fn order_type_defaults_to_normal() {
        assert_eq!(OrderType::default(), OrderType::Normal);
        assert_eq!("crowdfunding".parse::<OrderType>().unwrap(), OrderType::Crowdfunding);
    }

    #[test]
    fn refund_happy_path() {
        let product = ProductId::new();
        let mut order = paid_order(product);
        assert!(order.contains_product(product));
        assert!(order.is_refundable());

        let no = order.begin_refund(Utc::now()).unwrap().to_string();
        assert_eq!(order.refund_status, RefundStatus::Processing);
        assert_eq!(order.refund_no.as_deref(), Some(no.as_str()));

        order.complete_refund().unwrap();
        assert_eq!(order.refund_status, RefundStatus::Success);
        assert!(!order.is_refundable());
        assert!(matches!(order.begin_refund(Utc::now()), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn retries_reuse_the_refund_number() {
        let mut order = paid_order(ProductId::new());
        let first = order.begin_refund(Utc::now()).unwrap().to_string();
        order.fail_refund("insufficient merchant balance").unwrap();
        assert_eq!(order.refund_reason.as_deref(), Some("insufficient merchant balance"));

        let second = order.begin_refund(Utc::now()).unwrap().to_string();
        assert_eq!(first, second);
        assert!(order.refund_reason.is_none());
    }

    #[test]
    fn unpaid_orders_cannot_be_refunded() {
        let mut order = paid_order(ProductId::new());
        order.paid_at = None;
        assert!(!order.is_refundable());
        assert!(order.begin_refund(Utc::now()).is_err());
    }

    #[test]
    fn completion_requires_processing() {
        let mut order = paid_order(ProductId::new());
        assert!(order.complete_refund().is_err());
        assert!(order.fail_refund("nope").is_err());
    }

    #[test]
    fn refund_numbers_are_unique_and_time_prefixed() {
        let now = Utc::now();
        let a = new_refund_no(now);
        let b = new_refund_no(now);
        assert_ne!(a, b);
        assert!(a.starts_with(&now.format("%Y%m%d").to_string()));
        assert_eq!(a.len(), 26);
    }

    #[derive(Debug, Clone)]
    enum Step {
        Begin,
        Complete,
        Fail,
    }

    proptest! {
        #[test]
        fn a_successful_refund_is_final(steps in prop::collection::vec(
            prop_oneof![Just(Step::Begin), Just(Step::Complete), Just(Step::Fail)],
            0..30,
        )) {
            let mut order = paid_order(ProductId::new());
            let mut refunded = false;
            let mut refund_no: Option<String> = None;

            for step in steps {
                let _ = match step {
                    Step::Begin => order.begin_refund(Utc::now()).map(|_| ()),
                    Step::Complete => order.complete_refund(),
                    Step::Fail => order.fail_refund("rejected"),
                };
                refunded |= order.refund_status == RefundStatus::Success;
                if refunded {
                    prop_assert_eq!(order.refund_status, RefundStatus::Success);
                }
                if let Some(no) = &refund_no {
                    prop_assert_eq!(order.refund_no.as_ref(), Some(no));
                }
                refund_no = order.refund_no.clone();
            }
        }
    }
}
