use std::sync::Arc;

use serde::Serialize;

use backoffice_catalog::Category;
use backoffice_core::CategoryId;

use super::AdminError;
use crate::repository::{CategoryRepository, Page};

/// One option of the remote category picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryOption {
    pub id: CategoryId,
    pub text: String,
}

impl From<Category> for CategoryOption {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            text: category.full_name,
        }
    }
}

/// Paginated picker response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryOptions {
    pub data: Vec<CategoryOption>,
    pub current_page: u32,
    pub per_page: u32,
    pub total: u64,
}

/// Backs the category select on product forms.
pub struct CategoryLookup {
    categories: Arc<dyn CategoryRepository>,
}

impl CategoryLookup {
    pub const PER_PAGE: u32 = 10;

    pub fn new(categories: Arc<dyn CategoryRepository>) -> Self {
        Self { categories }
    }

    pub async fn search(&self, query: &str, is_directory: Option<bool>, page: u32) -> Result<CategoryOptions, AdminError> {
        let found = self
            .categories
            .search(query, is_directory, Page::new(page, Self::PER_PAGE))
            .await?
            .map(CategoryOption::from);
        Ok(CategoryOptions {
            data: found.items,
            current_page: found.page,
            per_page: found.per_page,
            total: found.total,
        })
    }
}
