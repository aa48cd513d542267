//! Product save pipeline.
//!
//! `validate → build SKU set → recompute_price → ProductChanges`. The pipeline is
//! pure: callers load the existing product and the referenced category, call
//! [`prepare_save`] and persist the returned [`ProductChanges`] in one write.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use backoffice_core::{DomainError, DomainResult, FieldErrors, ProductId, SkuId};

use crate::category::Category;
use crate::crowdfunding::CrowdfundingProduct;
use crate::form::{self, ProductForm, SkuRow};
use crate::pricing::{SkuEntry, recompute_price};
use crate::product::{Product, ProductType, Sku};
use crate::variant::ProductVariant;

/// Inputs of one admin save.
#[derive(Debug, Clone, Copy)]
pub struct SaveRequest<'a> {
    pub form: &'a ProductForm,
    /// Product being edited; `None` on create.
    pub existing: Option<&'a Product>,
    /// Category referenced by `form.category_id`, if it exists.
    pub category: Option<&'a Category>,
    pub now: DateTime<Utc>,
}

/// Validated result of a save, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductChanges {
    /// Full product after the save (SKUs and campaign included).
    pub product: Product,
    /// Existing SKUs the submission removed.
    pub removed_skus: Vec<SkuId>,
}

/// Validate a submitted form and build the product it describes.
///
/// Every field problem is collected into one [`DomainError::Form`]. Editing a
/// product that belongs to another variant is reported as [`DomainError::NotFound`].
pub fn prepare_save<V>(variant: &V, req: SaveRequest<'_>) -> DomainResult<ProductChanges>
where
    V: ProductVariant + ?Sized,
{
    let product_type = variant.describe_type();
    if let Some(existing) = req.existing {
        if existing.product_type != product_type {
            return Err(DomainError::not_found());
        }
    }

    let form = req.form;
    let product_id = req.existing.map(|p| p.id).unwrap_or_default();
    let mut errors = FieldErrors::new();

    let title = form::required_text(&mut errors, "title", &form.title);
    let description = form::required_text(&mut errors, "description", &form.description);
    let image = form::image_path(&mut errors, "image", form.image.as_deref());
    check_category(&mut errors, form, req.category);

    let entries = sku_entries(&mut errors, product_id, &form.skus, req.existing);
    let price = recompute_price(&entries);
    if price.is_none() && !errors.contains("skus") {
        errors.add("skus", "at least one SKU is required");
    }

    let terms = variant.read_terms(form, &mut errors);
    errors.into_result()?;

    let crowdfunding = match (product_type, terms) {
        (ProductType::Crowdfunding, Some(terms)) => {
            let campaign = match req.existing.and_then(|p| p.crowdfunding.clone()) {
                Some(mut campaign) => {
                    campaign.revise_terms(terms)?;
                    campaign
                }
                None => CrowdfundingProduct::open(product_id, terms),
            };
            Some(campaign)
        }
        _ => None,
    };

    let removed_skus = entries
        .iter()
        .filter_map(|e| match e {
            SkuEntry::Remove(id) => *id,
            SkuEntry::Keep(_) => None,
        })
        .collect();
    let skus: Vec<Sku> = entries
        .into_iter()
        .filter_map(|e| match e {
            SkuEntry::Keep(sku) => Some(sku),
            SkuEntry::Remove(_) => None,
        })
        .collect();

    let (title, description, image, price) = match (title, description, image, price) {
        (Some(t), Some(d), Some(i), Some(p)) => (t, d, i, p),
        _ => return Err(DomainError::invariant("validated form is missing a required value")),
    };

    let product = match req.existing {
        Some(existing) => Product {
            category_id: form.category_id,
            title,
            description,
            image,
            on_sale: form.on_sale(),
            price,
            skus,
            crowdfunding,
            updated_at: req.now,
            ..existing.clone()
        },
        None => Product {
            id: product_id,
            product_type,
            category_id: form.category_id,
            title,
            description,
            image,
            on_sale: form.on_sale(),
            rating: Decimal::from(5),
            sold_count: 0,
            review_count: 0,
            price,
            skus,
            crowdfunding,
            created_at: req.now,
            updated_at: req.now,
        },
    };

    Ok(ProductChanges { product, removed_skus })
}

fn check_category(errors: &mut FieldErrors, form: &ProductForm, category: Option<&Category>) {
    let Some(wanted) = form.category_id else {
        return;
    };
    match category {
        Some(c) if c.id == wanted && c.accepts_products() => {}
        Some(c) if c.id == wanted => errors.add("category_id", "must not be a directory"),
        _ => errors.add("category_id", "does not exist"),
    }
}

/// Turn submitted rows into SKU entries, then append the existing SKUs the
/// submission did not mention.
fn sku_entries(
    errors: &mut FieldErrors,
    product_id: ProductId,
    rows: &[SkuRow],
    existing: Option<&Product>,
) -> Vec<SkuEntry> {
    let belongs = |id: SkuId| existing.is_some_and(|p| p.sku(id).is_some());
    let mut mentioned = HashSet::new();
    let mut entries = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        if let Some(id) = row.id {
            if !belongs(id) {
                errors.add(format!("skus.{i}.id"), "does not belong to this product");
                continue;
            }
            if !mentioned.insert(id) {
                errors.add(format!("skus.{i}.id"), "is listed more than once");
                continue;
            }
        }

        if row.is_removed() {
            entries.push(SkuEntry::Remove(row.id));
            continue;
        }

        let title = form::required_text(errors, &format!("skus.{i}.title"), &row.title);
        let description = form::required_text(errors, &format!("skus.{i}.description"), &row.description);
        let price = form::positive_decimal(errors, &format!("skus.{i}.price"), row.price.as_ref());
        let stock = form::non_negative_integer(errors, &format!("skus.{i}.stock"), row.stock.as_ref());

        if let (Some(title), Some(description), Some(price), Some(stock)) = (title, description, price, stock) {
            entries.push(SkuEntry::Keep(Sku {
                id: row.id.unwrap_or_default(),
                product_id,
                title,
                description,
                price,
                stock,
            }));
        }
    }

    if let Some(product) = existing {
        entries.extend(
            product
                .skus
                .iter()
                .filter(|s| !mentioned.contains(&s.id))
                .cloned()
                .map(SkuEntry::Keep),
        );
    }

    entries
}
