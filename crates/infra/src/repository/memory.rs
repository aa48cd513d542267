//! In-memory repositories, used by tests and database-less runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use backoffice_catalog::{Category, CrowdfundingProduct, CrowdfundingStatus, Product, ProductChanges, ProductType};
use backoffice_core::{CategoryId, Entity, OrderId, ProductId};
use backoffice_sales::{Order, OrderType};

use super::{
    CategoryRepository, CrowdfundingRepository, OrderRepository, Page, Paged, ProductRepository, RepoResult,
    RepositoryError,
};

#[derive(Debug, Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    categories: BTreeMap<CategoryId, Category>,
    orders: BTreeMap<OrderId, Order>,
    refunds_queued: BTreeMap<ProductId, DateTime<Utc>>,
}

/// One store backing every repository trait.
///
/// Campaigns live inside their product, mirroring how the admin reads them.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> RepoResult<T> {
        let state = self
            .state
            .read()
            .map_err(|e| RepositoryError::Storage(format!("lock poisoned: {e}")))?;
        Ok(f(&state))
    }

    fn write<T>(&self, f: impl FnOnce(&mut State) -> RepoResult<T>) -> RepoResult<T> {
        let mut state = self
            .state
            .write()
            .map_err(|e| RepositoryError::Storage(format!("lock poisoned: {e}")))?;
        f(&mut state)
    }
}

/// Insert keyed by entity id; an id already present is a conflict.
fn insert_new<E: Entity + Clone>(map: &mut BTreeMap<E::Id, E>, entity: &E, what: &str) -> RepoResult<()> {
    let id = entity.id().clone();
    if map.contains_key(&id) {
        return Err(RepositoryError::Conflict(format!("{what} {id} already exists")));
    }
    map.insert(id, entity.clone());
    Ok(())
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn list_by_type(&self, product_type: ProductType, page: Page) -> RepoResult<Paged<Product>> {
        self.read(|state| {
            let matching = state
                .products
                .values()
                .rev()
                .filter(|p| p.product_type == product_type)
                .cloned()
                .collect();
            Paged::slice(matching, page)
        })
    }

    async fn get(&self, id: ProductId) -> RepoResult<Option<Product>> {
        self.read(|state| state.products.get(&id).cloned())
    }

    async fn save(&self, changes: &ProductChanges) -> RepoResult<()> {
        self.write(|state| {
            let mut product = changes.product.clone();
            if let Some(category_id) = product.category_id {
                if !state.categories.contains_key(&category_id) {
                    return Err(RepositoryError::Conflict(format!("category {category_id} does not exist")));
                }
            }

            if let (Some(incoming), Some(stored)) = (
                product.crowdfunding.as_mut(),
                state.products.get(&product.id).and_then(|p| p.crowdfunding.as_ref()),
            ) {
                incoming.total_amount = stored.total_amount;
                incoming.user_count = stored.user_count;
                incoming.status = stored.status;
                if stored.status != CrowdfundingStatus::Funding {
                    incoming.target_amount = stored.target_amount;
                    incoming.end_at = stored.end_at;
                }
            }

            state.products.insert(product.id, product);
            Ok(())
        })
    }
}

#[async_trait]
impl CategoryRepository for InMemoryStore {
    async fn get(&self, id: CategoryId) -> RepoResult<Option<Category>> {
        self.read(|state| state.categories.get(&id).cloned())
    }

    async fn insert(&self, category: &Category) -> RepoResult<()> {
        self.write(|state| {
            insert_new(&mut state.categories, category, "category")
        })
    }

    async fn search(&self, query: &str, is_directory: Option<bool>, page: Page) -> RepoResult<Paged<Category>> {
        self.read(|state| {
            let mut matching: Vec<Category> = state
                .categories
                .values()
                .filter(|c| c.matches(query))
                .filter(|c| is_directory.is_none_or(|d| c.is_directory == d))
                .cloned()
                .collect();
            matching.sort_by(|a, b| a.full_name.cmp(&b.full_name));
            Paged::slice(matching, page)
        })
    }
}

#[async_trait]
impl CrowdfundingRepository for InMemoryStore {
    async fn due_for_finalization(&self, now: DateTime<Utc>) -> RepoResult<Vec<CrowdfundingProduct>> {
        self.read(|state| {
            let mut due: Vec<CrowdfundingProduct> = state
                .products
                .values()
                .filter_map(|p| p.crowdfunding.as_ref())
                .filter(|c| c.status == CrowdfundingStatus::Funding && c.is_due(now))
                .cloned()
                .collect();
            due.sort_by_key(|c| c.end_at);
            due
        })
    }

    async fn get(&self, product_id: ProductId) -> RepoResult<Option<CrowdfundingProduct>> {
        self.read(|state| {
            state
                .products
                .get(&product_id)
                .and_then(|p| p.crowdfunding.clone())
        })
    }

    async fn transition_status(
        &self,
        product_id: ProductId,
        from: CrowdfundingStatus,
        to: CrowdfundingStatus,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        self.write(|state| {
            let campaign = state
                .products
                .get_mut(&product_id)
                .and_then(|p| p.crowdfunding.as_mut());
            match campaign {
                Some(c) if c.status == from && c.is_due(now) => {
                    c.status = to;
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    async fn awaiting_refund_job(&self) -> RepoResult<Vec<ProductId>> {
        self.read(|state| {
            let mut failed: Vec<&CrowdfundingProduct> = state
                .products
                .values()
                .filter_map(|p| p.crowdfunding.as_ref())
                .filter(|c| c.status == CrowdfundingStatus::Fail && !state.refunds_queued.contains_key(&c.product_id))
                .collect();
            failed.sort_by_key(|c| c.end_at);
            failed.into_iter().map(|c| c.product_id).collect()
        })
    }

    async fn mark_refund_queued(&self, product_id: ProductId, at: DateTime<Utc>) -> RepoResult<()> {
        self.write(|state| {
            state.refunds_queued.entry(product_id).or_insert(at);
            Ok(())
        })
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert(&self, order: &Order) -> RepoResult<()> {
        self.write(|state| {
            if state.orders.values().any(|o| o.no == order.no) {
                return Err(RepositoryError::Conflict(format!("order {} already exists", order.no)));
            }
            insert_new(&mut state.orders, order, "order")
        })
    }

    async fn get(&self, id: OrderId) -> RepoResult<Option<Order>> {
        self.read(|state| state.orders.get(&id).cloned())
    }

    async fn refundable_crowdfunding_orders(&self, product_id: ProductId) -> RepoResult<Vec<Order>> {
        self.read(|state| {
            let mut orders: Vec<Order> = state
                .orders
                .values()
                .filter(|o| o.order_type == OrderType::Crowdfunding)
                .filter(|o| o.is_refundable() && o.contains_product(product_id))
                .cloned()
                .collect();
            orders.sort_by_key(|o| o.created_at);
            orders
        })
    }

    async fn update_refund(&self, order: &Order) -> RepoResult<()> {
        self.write(|state| {
            let stored = state
                .orders
                .get_mut(&order.id)
                .ok_or_else(|| RepositoryError::Conflict(format!("order {} does not exist", order.no)))?;
            stored.refund_status = order.refund_status;
            stored.refund_no = order.refund_no.clone();
            stored.refund_reason = order.refund_reason.clone();
            Ok(())
        })
    }
}
