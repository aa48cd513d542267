//! Fixtures shared by the infra unit tests.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use backoffice_catalog::{CrowdfundingProduct, CrowdfundingTerms, Product, ProductChanges, ProductType, Sku};
use backoffice_core::{OrderId, ProductId, SkuId, UserId};
use backoffice_sales::{Order, OrderItem, OrderType, RefundStatus};

pub fn normal_product(title: &str, price: Decimal, now: DateTime<Utc>) -> Product {
    let id = ProductId::new();
    Product {
        id,
        product_type: ProductType::Normal,
        category_id: None,
        title: title.to_string(),
        description: format!("{title} description"),
        image: "images/product.png".to_string(),
        on_sale: true,
        rating: Decimal::from(5),
        sold_count: 0,
        review_count: 0,
        price,
        skus: vec![Sku {
            id: SkuId::new(),
            product_id: id,
            title: "Default".to_string(),
            description: "Default SKU".to_string(),
            price,
            stock: 10,
        }],
        crowdfunding: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn crowdfunding_product(
    target_amount: Decimal,
    total_amount: Decimal,
    end_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Product {
    let mut product = normal_product("Campaign", Decimal::from(100), now);
    product.product_type = ProductType::Crowdfunding;
    product.crowdfunding = Some(CrowdfundingProduct {
        total_amount,
        ..CrowdfundingProduct::open(product.id, CrowdfundingTerms { target_amount, end_at })
    });
    product
}

pub fn changes(product: &Product) -> ProductChanges {
    ProductChanges {
        product: product.clone(),
        removed_skus: Vec::new(),
    }
}

pub fn crowdfunding_order(product_id: ProductId, paid_at: Option<DateTime<Utc>>) -> Order {
    let id = OrderId::new();
    Order {
        id,
        no: format!("CF{}", id.as_uuid().simple()),
        order_type: OrderType::Crowdfunding,
        user_id: UserId::new(),
        items: vec![OrderItem {
            product_id,
            sku_id: SkuId::new(),
            amount: 1,
            price: Decimal::from(100),
        }],
        total_amount: Decimal::from(100),
        paid_at,
        payment_method: paid_at.map(|_| "alipay".to_string()),
        payment_no: paid_at.map(|_| format!("PAY{}", id.as_uuid().simple())),
        refund_status: RefundStatus::Pending,
        refund_no: None,
        refund_reason: None,
        closed: false,
        created_at: paid_at.unwrap_or_else(Utc::now),
    }
}
