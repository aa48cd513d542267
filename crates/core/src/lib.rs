//! `backoffice-core` — domain foundation building blocks.
//!
//! Identifiers, the domain error model and the `Entity` trait shared by the catalog
//! and sales crates. No infrastructure concerns live here.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult, FieldErrors};
pub use id::{CategoryId, OrderId, ProductId, SkuId, UserId};
