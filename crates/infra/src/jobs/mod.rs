//! Background job system with retry, backoff, and dead-letter handling.
//!
//! - `Job`: kind, JSON payload, status, retry policy and attempt history
//! - `JobStore`: persistence (in-memory, or Postgres with `SKIP LOCKED` claiming)
//! - `JobExecutor`: routes claimed jobs to handlers, applies retries, dead-letters
//!   exhausted jobs
//!
//! The crowdfunding finalizer produces `crowdfunding.refund_orders` jobs here;
//! the refund handler consumes them.

pub mod executor;
pub mod postgres;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{BackoffStrategy, DeadLetterEntry, Job, JobAttemptRecord, JobId, JobKind, JobResult, JobStatus, RetryPolicy};
