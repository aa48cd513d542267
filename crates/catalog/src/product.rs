use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::{CategoryId, DomainError, Entity, ProductId, SkuId};

use crate::crowdfunding::CrowdfundingProduct;

/// Product type discriminator.
///
/// Both variants share the `products` table; the type decides which admin
/// variant may edit the product and whether a crowdfunding campaign is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Normal,
    Crowdfunding,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Normal => "normal",
            ProductType::Crowdfunding => "crowdfunding",
        }
    }
}

impl core::fmt::Display for ProductType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ProductType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ProductType::Normal),
            "crowdfunding" => Ok(ProductType::Crowdfunding),
            other => Err(DomainError::validation(format!("unknown product type: {other}"))),
        }
    }
}

/// A sellable variation of a product (size, color, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sku {
    pub id: SkuId,
    pub product_id: ProductId,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub stock: u32,
}

impl Entity for Sku {
    type Id = SkuId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Product with its SKUs and, for crowdfunding products, the campaign.
///
/// `price` is derived: it always holds the lowest SKU price at the time of the last
/// save (see [`crate::pricing::recompute_price`]). Only the save pipeline in
/// [`crate::editor`] produces new product values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    #[serde(rename = "type")]
    pub product_type: ProductType,
    pub category_id: Option<CategoryId>,
    pub title: String,
    pub description: String,
    pub image: String,
    pub on_sale: bool,
    pub rating: Decimal,
    pub sold_count: u64,
    pub review_count: u64,
    pub price: Decimal,
    pub skus: Vec<Sku>,
    pub crowdfunding: Option<CrowdfundingProduct>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn sku(&self, id: SkuId) -> Option<&Sku> {
        self.skus.iter().find(|s| s.id == id)
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sku(product_id: ProductId, price: Decimal, stock: u32) -> Sku {
        Sku {
            id: SkuId::new(),
            product_id,
            title: "Default".to_string(),
            description: "Default SKU".to_string(),
            price,
            stock,
        }
    }

    #[test]
    fn product_type_parses_its_own_rendering() {
        for t in [ProductType::Normal, ProductType::Crowdfunding] {
            assert_eq!(t.as_str().parse::<ProductType>().unwrap(), t);
        }
        assert!("bundle".parse::<ProductType>().is_err());
    }

    #[test]
    fn product_type_serializes_lowercase() {
        let json = serde_json::to_value(ProductType::Crowdfunding).unwrap();
        assert_eq!(json, serde_json::json!("crowdfunding"));
    }

    #[test]
    fn skus_are_found_by_id() {
        let id = ProductId::new();
        let now = Utc::now();
        let product = Product {
            id,
            product_type: ProductType::Normal,
            category_id: None,
            title: "Keyboard".to_string(),
            description: "Mechanical".to_string(),
            image: "images/keyboard.png".to_string(),
            on_sale: true,
            rating: dec!(5),
            sold_count: 0,
            review_count: 0,
            price: dec!(49.00),
            skus: vec![sku(id, dec!(59.00), 3), sku(id, dec!(49.00), 7)],
            crowdfunding: None,
            created_at: now,
            updated_at: now,
        };

        let first = product.skus[0].id;
        assert_eq!(product.sku(first).map(|s| s.stock), Some(3));
        assert!(product.sku(SkuId::new()).is_none());
    }
}
