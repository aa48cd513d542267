//! Orders domain module.
//!
//! Storefront orders as seen by the back office: the order type discriminator,
//! the refund state machine, and the [`RefundGateway`] seam through which refunds
//! reach the payment provider. Deterministic domain logic only; the gateway is
//! implemented elsewhere.

pub mod order;
pub mod refund;

pub use order::{Order, OrderItem, OrderType, RefundStatus, new_refund_no};
pub use refund::{RefundError, RefundGateway, RefundReceipt, RefundRequest};
