//! Derived product price.

use rust_decimal::Decimal;

use backoffice_core::SkuId;

use crate::product::Sku;

/// One row of a nested SKU submission after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkuEntry {
    /// Row kept (new, updated, or an existing SKU the submission did not touch).
    Keep(Sku),
    /// Row flagged for removal. `None` for a row that was added and removed in the
    /// same edit, which never reached storage.
    Remove(Option<SkuId>),
}

impl SkuEntry {
    pub fn kept(&self) -> Option<&Sku> {
        match self {
            SkuEntry::Keep(sku) => Some(sku),
            SkuEntry::Remove(_) => None,
        }
    }
}

/// Product price: the lowest price among entries whose removal flag is not set.
///
/// `None` when every entry is removed.
pub fn recompute_price<'a, I>(entries: I) -> Option<Decimal>
where
    I: IntoIterator<Item = &'a SkuEntry>,
{
    entries
        .into_iter()
        .filter_map(SkuEntry::kept)
        .map(|sku| sku.price)
        .min()
}
