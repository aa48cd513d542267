//! Product variants.
//!
//! Each admin product screen (normal products, crowdfunding products) is a
//! [`ProductVariant`]: it names the product type it manages, the extra list
//! columns and form fields it shows, and how it reads its variant-specific terms
//! out of a submitted form. A single generic admin handler composes a variant
//! with storage; variants never talk to storage themselves.

use serde::Serialize;

use backoffice_core::FieldErrors;

use crate::crowdfunding::CrowdfundingTerms;
use crate::form::{self, ProductForm};
use crate::product::ProductType;

/// Kind of UI widget a field maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    RichText,
    Image,
    Flag,
    Decimal,
    Integer,
    DateTime,
    /// Select backed by a remote search endpoint.
    RemoteSelect { source: &'static str },
    /// One-to-many sub-form.
    Nested { fields: Vec<FieldSpec> },
}

/// Description of one list column or form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: false,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Row and bulk actions the admin grid may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdminActions {
    pub view: bool,
    pub delete: bool,
    pub batch_delete: bool,
}

impl AdminActions {
    /// Products are never deleted from the back office.
    pub const PRODUCTS: AdminActions = AdminActions {
        view: false,
        delete: false,
        batch_delete: false,
    };
}

/// Capability set of one admin product screen.
pub trait ProductVariant: Send + Sync + 'static {
    /// Product type this variant lists, creates and edits.
    fn describe_type(&self) -> ProductType;

    /// Variant-specific list columns (after `id` and `title`).
    fn list_fields(&self) -> Vec<FieldSpec>;

    /// Variant-specific form fields (after the shared product fields).
    fn form_fields(&self) -> Vec<FieldSpec>;

    /// Read variant terms from the form, recording problems in `errors`.
    ///
    /// Returns `None` for variants without terms, or when the terms are invalid.
    fn read_terms(&self, form: &ProductForm, errors: &mut FieldErrors) -> Option<CrowdfundingTerms>;
}

/// Normal products: fixed price, no campaign.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalProducts;

impl ProductVariant for NormalProducts {
    fn describe_type(&self) -> ProductType {
        ProductType::Normal
    }

    fn list_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("category.name", "Category", FieldKind::Text),
            FieldSpec::new("on_sale", "On sale", FieldKind::Flag),
            FieldSpec::new("price", "Price", FieldKind::Decimal),
            FieldSpec::new("rating", "Rating", FieldKind::Decimal),
            FieldSpec::new("sold_count", "Sold", FieldKind::Integer),
            FieldSpec::new("review_count", "Reviews", FieldKind::Integer),
        ]
    }

    fn form_fields(&self) -> Vec<FieldSpec> {
        Vec::new()
    }

    fn read_terms(&self, _form: &ProductForm, _errors: &mut FieldErrors) -> Option<CrowdfundingTerms> {
        None
    }
}

/// Crowdfunding products: campaign target and deadline on top of the product.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrowdfundingProducts;

impl ProductVariant for CrowdfundingProducts {
    fn describe_type(&self) -> ProductType {
        ProductType::Crowdfunding
    }

    fn list_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("on_sale", "On sale", FieldKind::Flag),
            FieldSpec::new("price", "Price", FieldKind::Decimal),
            FieldSpec::new("crowdfunding.target_amount", "Target amount", FieldKind::Decimal),
            FieldSpec::new("crowdfunding.end_at", "Ends at", FieldKind::DateTime),
            FieldSpec::new("crowdfunding.total_amount", "Pledged", FieldKind::Decimal),
            FieldSpec::new("crowdfunding.status", "Status", FieldKind::Text),
        ]
    }

    fn form_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("crowdfunding.target_amount", "Target amount", FieldKind::Decimal).required(),
            FieldSpec::new("crowdfunding.end_at", "Ends at", FieldKind::DateTime).required(),
        ]
    }

    fn read_terms(&self, form: &ProductForm, errors: &mut FieldErrors) -> Option<CrowdfundingTerms> {
        let input = form.crowdfunding.clone().unwrap_or_default();
        let target_amount = form::positive_decimal(
            errors,
            "crowdfunding.target_amount",
            input.target_amount.as_ref(),
        );
        let end_at = form::date_time(errors, "crowdfunding.end_at", input.end_at.as_deref());

        Some(CrowdfundingTerms {
            target_amount: target_amount?,
            end_at: end_at?,
        })
    }
}

/// Everything a generic admin UI needs to render one variant's screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminSchema {
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub list_fields: Vec<FieldSpec>,
    pub form_fields: Vec<FieldSpec>,
    pub actions: AdminActions,
}

impl AdminSchema {
    pub fn for_variant<V: ProductVariant + ?Sized>(variant: &V) -> Self {
        let mut list_fields = vec![
            FieldSpec::new("id", "ID", FieldKind::Text),
            FieldSpec::new("title", "Title", FieldKind::Text),
        ];
        list_fields.extend(variant.list_fields());

        let mut form_fields = vec![
            FieldSpec::new("title", "Title", FieldKind::Text).required(),
            FieldSpec::new(
                "category_id",
                "Category",
                FieldKind::RemoteSelect {
                    source: "/admin/api/categories?is_directory=0",
                },
            ),
            FieldSpec::new("image", "Cover image", FieldKind::Image).required(),
            FieldSpec::new("description", "Description", FieldKind::RichText).required(),
            FieldSpec::new("on_sale", "On sale", FieldKind::Flag),
        ];
        form_fields.extend(variant.form_fields());
        form_fields.push(
            FieldSpec::new(
                "skus",
                "SKUs",
                FieldKind::Nested {
                    fields: vec![
                        FieldSpec::new("title", "SKU name", FieldKind::Text).required(),
                        FieldSpec::new("description", "SKU description", FieldKind::Text).required(),
                        FieldSpec::new("price", "Unit price", FieldKind::Decimal).required(),
                        FieldSpec::new("stock", "Stock", FieldKind::Integer).required(),
                    ],
                },
            )
            .required(),
        );

        Self {
            product_type: variant.describe_type(),
            list_fields,
            form_fields,
            actions: AdminActions::PRODUCTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::CrowdfundingInput;
    use rust_decimal_macros::dec;

    #[test]
    fn variants_describe_their_type() {
        assert_eq!(NormalProducts.describe_type(), ProductType::Normal);
        assert_eq!(CrowdfundingProducts.describe_type(), ProductType::Crowdfunding);
    }

    #[test]
    fn schema_never_offers_deletion() {
        for schema in [
            AdminSchema::for_variant(&NormalProducts),
            AdminSchema::for_variant(&CrowdfundingProducts),
        ] {
            assert!(!schema.actions.delete);
            assert!(!schema.actions.batch_delete);
            assert!(!schema.form_fields.iter().any(|f| f.name == "type"));
        }
    }

    #[test]
    fn crowdfunding_schema_adds_campaign_fields() {
        let schema = AdminSchema::for_variant(&CrowdfundingProducts);
        let names: Vec<_> = schema.form_fields.iter().map(|f| f.name).collect();
        assert!(names.contains(&"crowdfunding.target_amount"));
        assert!(names.contains(&"crowdfunding.end_at"));
        assert_eq!(names.last(), Some(&"skus"));

        let normal = AdminSchema::for_variant(&NormalProducts);
        assert!(!normal.form_fields.iter().any(|f| f.name.starts_with("crowdfunding")));
    }

    #[test]
    fn crowdfunding_terms_are_required() {
        let mut errors = FieldErrors::new();
        let terms = CrowdfundingProducts.read_terms(&ProductForm::default(), &mut errors);
        assert!(terms.is_none());
        assert!(errors.contains("crowdfunding.target_amount"));
        assert!(errors.contains("crowdfunding.end_at"));
    }

    #[test]
    fn crowdfunding_terms_are_parsed() {
        let form = ProductForm {
            crowdfunding: Some(CrowdfundingInput {
                target_amount: Some("10000".into()),
                end_at: Some("2026-12-31 23:59:59".to_string()),
            }),
            ..Default::default()
        };
        let mut errors = FieldErrors::new();
        let terms = CrowdfundingProducts.read_terms(&form, &mut errors).unwrap();
        assert!(errors.is_empty());
        assert_eq!(terms.target_amount, dec!(10000));
    }

    #[test]
    fn normal_products_ignore_campaign_input() {
        let form = ProductForm {
            crowdfunding: Some(CrowdfundingInput::default()),
            ..Default::default()
        };
        let mut errors = FieldErrors::new();
        assert!(NormalProducts.read_terms(&form, &mut errors).is_none());
        assert!(errors.is_empty());
    }
}
