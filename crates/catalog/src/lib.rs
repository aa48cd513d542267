//! Catalog domain module.
//!
//! Products, SKUs, categories and crowdfunding campaigns, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). The two rules that
//! matter live here:
//!
//! - [`crowdfunding::finalize`]: the campaign lifecycle decision taken once a
//!   deadline passes.
//! - [`editor::prepare_save`]: the product save pipeline, which validates the
//!   submitted form and derives the product price from its SKUs.

pub mod category;
pub mod crowdfunding;
pub mod editor;
pub mod form;
pub mod pricing;
pub mod product;
pub mod variant;

pub use category::Category;
pub use crowdfunding::{CrowdfundingProduct, CrowdfundingStatus, CrowdfundingTerms, Finalization, finalize};
pub use editor::{ProductChanges, SaveRequest, prepare_save};
pub use form::{CrowdfundingInput, FormValue, ProductForm, SkuRow};
pub use pricing::{SkuEntry, recompute_price};
pub use product::{Product, ProductType, Sku};
pub use variant::{AdminActions, AdminSchema, CrowdfundingProducts, FieldKind, FieldSpec, NormalProducts, ProductVariant};
