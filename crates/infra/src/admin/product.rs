use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

use backoffice_catalog::{
    AdminSchema, Category, Product, ProductChanges, ProductForm, ProductVariant, SaveRequest, prepare_save,
};
use backoffice_core::{CategoryId, ProductId};

use super::AdminError;
use crate::repository::{CategoryRepository, Page, Paged, ProductRepository};

/// Product as shown on admin screens: the stored product plus the values the
/// list columns derive from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRecord {
    #[serde(flatten)]
    pub product: Product,
    pub category: Option<Category>,
    /// Campaign progress in percent; crowdfunding products only.
    pub percent: Option<Decimal>,
}

/// Product admin screen for one variant.
///
/// The variant fixes the product type: listing is filtered by it, and products
/// of another type are invisible (not found) through this screen.
pub struct ProductAdmin<V> {
    variant: V,
    products: Arc<dyn ProductRepository>,
    categories: Arc<dyn CategoryRepository>,
}

impl<V: ProductVariant> ProductAdmin<V> {
    pub fn new(variant: V, products: Arc<dyn ProductRepository>, categories: Arc<dyn CategoryRepository>) -> Self {
        Self {
            variant,
            products,
            categories,
        }
    }

    pub fn schema(&self) -> AdminSchema {
        AdminSchema::for_variant(&self.variant)
    }

    pub async fn list(&self, page: Page) -> Result<Paged<Product>, AdminError> {
        Ok(self.products.list_by_type(self.variant.describe_type(), page).await?)
    }

    pub async fn get(&self, id: ProductId) -> Result<Product, AdminError> {
        self.products
            .get(id)
            .await?
            .filter(|p| p.product_type == self.variant.describe_type())
            .ok_or_else(AdminError::not_found)
    }

    #[instrument(skip(self, form), fields(product_type = %self.variant.describe_type()), err)]
    pub async fn create(&self, form: &ProductForm) -> Result<Product, AdminError> {
        let changes = self.prepare(form, None).await?;
        self.persist(changes).await
    }

    #[instrument(skip(self, form), fields(product_type = %self.variant.describe_type()), err)]
    pub async fn update(&self, id: ProductId, form: &ProductForm) -> Result<Product, AdminError> {
        let existing = self.get(id).await?;
        let changes = self.prepare(form, Some(&existing)).await?;
        self.persist(changes).await
    }

    async fn prepare(&self, form: &ProductForm, existing: Option<&Product>) -> Result<ProductChanges, AdminError> {
        let category = match form.category_id {
            Some(id) => self.categories.get(id).await?,
            None => None,
        };
        let request = SaveRequest {
            form,
            existing,
            category: category.as_ref(),
            now: Utc::now(),
        };
        Ok(prepare_save(&self.variant, request)?)
    }

    async fn persist(&self, changes: ProductChanges) -> Result<Product, AdminError> {
        self.products.save(&changes).await?;
        info!(
            product_id = %changes.product.id,
            price = %changes.product.price,
            skus = changes.product.skus.len(),
            removed_skus = changes.removed_skus.len(),
            "product saved"
        );
        // Read back: storage owns campaign counters and status.
        self.get(changes.product.id).await
    }

    /// Attach category and campaign progress, loading each category once.
    pub async fn records(&self, products: Vec<Product>) -> Result<Vec<ProductRecord>, AdminError> {
        let mut categories: HashMap<CategoryId, Option<Category>> = HashMap::new();
        let mut records = Vec::with_capacity(products.len());
        for product in products {
            let category = match product.category_id {
                Some(id) => match categories.get(&id) {
                    Some(cached) => cached.clone(),
                    None => {
                        let loaded = self.categories.get(id).await?;
                        categories.insert(id, loaded.clone());
                        loaded
                    }
                },
                None => None,
            };
            let percent = product.crowdfunding.as_ref().map(|c| c.percent());
            records.push(ProductRecord {
                product,
                category,
                percent,
            });
        }
        Ok(records)
    }

    pub async fn record(&self, product: Product) -> Result<ProductRecord, AdminError> {
        let mut records = self.records(vec![product]).await?;
        records.pop().ok_or_else(AdminError::not_found)
    }
}
