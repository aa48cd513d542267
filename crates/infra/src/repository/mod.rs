//! Storage for the catalog and order models.
//!
//! Repository traits are async and object-safe; services hold them as
//! `Arc<dyn ...>`. Two implementations exist: [`InMemoryStore`] (tests and
//! database-less runs) and [`PgStore`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use backoffice_catalog::{Category, CrowdfundingProduct, CrowdfundingStatus, Product, ProductChanges, ProductType};
use backoffice_core::{CategoryId, OrderId, ProductId};
use backoffice_sales::Order;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("storage error: {0}")]
    Storage(String),
    /// A write clashed with existing data (unique key, missing parent row).
    #[error("conflict: {0}")]
    Conflict(String),
    /// A stored row could not be mapped back to the domain model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Paged<T> {
    /// Cut one page out of an already filtered and ordered list.
    pub fn slice(all: Vec<T>, page: Page) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .collect();
        Self {
            items,
            page: page.page,
            per_page: page.per_page,
            total,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Products of one type, newest (highest id) first.
    async fn list_by_type(&self, product_type: ProductType, page: Page) -> RepoResult<Paged<Product>>;

    async fn get(&self, id: ProductId) -> RepoResult<Option<Product>>;

    /// Write a validated save in one transaction: product row, SKU upserts,
    /// removed SKUs, campaign terms.
    ///
    /// Campaign counters and status of an existing campaign are never
    /// overwritten here; status only changes through
    /// [`CrowdfundingRepository::transition_status`].
    async fn save(&self, changes: &ProductChanges) -> RepoResult<()>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn get(&self, id: CategoryId) -> RepoResult<Option<Category>>;

    async fn insert(&self, category: &Category) -> RepoResult<()>;

    /// Case-insensitive search on the full name, ordered by full name.
    async fn search(&self, query: &str, is_directory: Option<bool>, page: Page) -> RepoResult<Paged<Category>>;
}

#[async_trait]
pub trait CrowdfundingRepository: Send + Sync {
    /// Campaigns still `funding` whose deadline is at or before `now`.
    async fn due_for_finalization(&self, now: DateTime<Utc>) -> RepoResult<Vec<CrowdfundingProduct>>;

    async fn get(&self, product_id: ProductId) -> RepoResult<Option<CrowdfundingProduct>>;

    /// Compare-and-set the campaign status. Returns `false` when the campaign
    /// is missing, no longer in `from`, or its deadline is still after `now`.
    async fn transition_status(
        &self,
        product_id: ProductId,
        from: CrowdfundingStatus,
        to: CrowdfundingStatus,
        now: DateTime<Utc>,
    ) -> RepoResult<bool>;

    /// Failed campaigns whose refund job is not recorded as queued, earliest deadline first.
    async fn awaiting_refund_job(&self) -> RepoResult<Vec<ProductId>>;

    /// Record that the refund job of a failed campaign is in the job queue.
    async fn mark_refund_queued(&self, product_id: ProductId, at: DateTime<Utc>) -> RepoResult<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> RepoResult<()>;

    async fn get(&self, id: OrderId) -> RepoResult<Option<Order>>;

    /// Paid crowdfunding orders containing `product_id` that are not refunded yet,
    /// oldest first.
    async fn refundable_crowdfunding_orders(&self, product_id: ProductId) -> RepoResult<Vec<Order>>;

    /// Persist `refund_status`, `refund_no` and `refund_reason`.
    async fn update_refund(&self, order: &Order) -> RepoResult<()>;
}
