//! Admin back-office services: product screens and the category picker.

pub mod category;
pub mod product;

use thiserror::Error;

use backoffice_core::DomainError;

use crate::repository::RepositoryError;

pub use category::{CategoryLookup, CategoryOption, CategoryOptions};
pub use product::{ProductAdmin, ProductRecord};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AdminError {
    pub fn not_found() -> Self {
        Self::Domain(DomainError::not_found())
    }
}
