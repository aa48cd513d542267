//! Crowdfunding campaign lifecycle: deadline finalization and refunds.
//!
//! The finalizer moves due campaigns out of `funding` with a compare-and-set
//! update and enqueues a `crowdfunding.refund_orders` job for each failed one.
//! [`RefundOrdersHandler`] consumes those jobs through the job executor.

pub mod finalizer;
pub mod refund;
pub mod scheduler;

pub use finalizer::{CrowdfundingFinalizer, FinalizeReport};
pub use refund::{LoggingRefundGateway, RefundJobError, RefundOrdersHandler, RefundOrdersPayload, RefundSummary};
pub use scheduler::{FinalizerHandle, FinalizerSchedule};
