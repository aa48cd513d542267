//! Postgres repositories over the tables created by [`crate::db::schema`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use backoffice_catalog::{Category, CrowdfundingProduct, CrowdfundingStatus, Product, ProductChanges, ProductType, Sku};
use backoffice_core::{CategoryId, OrderId, ProductId};
use backoffice_sales::{Order, OrderItem};

use super::{
    CategoryRepository, CrowdfundingRepository, OrderRepository, Page, Paged, ProductRepository, RepoResult,
    RepositoryError,
};

const PRODUCT_COLUMNS: &str = "id, type, category_id, title, description, image, on_sale, rating, \
                               sold_count, review_count, price, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, no, type, user_id, total_amount, paid_at, payment_method, payment_no, \
                             refund_status, refund_no, refund_reason, closed, created_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach SKUs and campaigns to product rows, preserving row order.
    async fn hydrate_products(&self, rows: &[PgRow]) -> RepoResult<Vec<Product>> {
        let mut products = rows.iter().map(product_from_row).collect::<RepoResult<Vec<_>>>()?;
        if products.is_empty() {
            return Ok(products);
        }
        let ids: Vec<Uuid> = products.iter().map(|p| *p.id.as_uuid()).collect();

        let sku_rows = sqlx::query(
            r#"
            SELECT id, product_id, title, description, price, stock
            FROM product_skus
            WHERE product_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_skus", e))?;

        let campaign_rows = sqlx::query(
            r#"
            SELECT product_id, target_amount, total_amount, user_count, end_at, status
            FROM crowdfunding_products
            WHERE product_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_campaigns", e))?;

        let mut skus: HashMap<ProductId, Vec<Sku>> = HashMap::new();
        for row in &sku_rows {
            let sku = sku_from_row(row)?;
            skus.entry(sku.product_id).or_default().push(sku);
        }
        let mut campaigns: HashMap<ProductId, CrowdfundingProduct> = HashMap::new();
        for row in &campaign_rows {
            let campaign = campaign_from_row(row)?;
            campaigns.insert(campaign.product_id, campaign);
        }

        for product in &mut products {
            product.skus = skus.remove(&product.id).unwrap_or_default();
            product.crowdfunding = campaigns.remove(&product.id);
        }
        Ok(products)
    }

    async fn hydrate_orders(&self, rows: &[PgRow]) -> RepoResult<Vec<Order>> {
        let mut orders = rows.iter().map(order_from_row).collect::<RepoResult<Vec<_>>>()?;
        if orders.is_empty() {
            return Ok(orders);
        }
        let ids: Vec<Uuid> = orders.iter().map(|o| *o.id.as_uuid()).collect();

        let item_rows = sqlx::query(
            r#"
            SELECT order_id, product_id, sku_id, amount, price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_order_items", e))?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let order_id = OrderId::from_uuid(column(row, "order_id")?);
            items.entry(order_id).or_default().push(OrderItem {
                product_id: ProductId::from_uuid(column(row, "product_id")?),
                sku_id: column::<Uuid>(row, "sku_id")?.into(),
                amount: to_u32(column(row, "amount")?, "amount")?,
                price: column(row, "price")?,
            });
        }
        for order in &mut orders {
            order.items = items.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }
}

#[async_trait]
impl ProductRepository for PgStore {
    #[instrument(skip(self), fields(product_type = %product_type), err)]
    async fn list_by_type(&self, product_type: ProductType, page: Page) -> RepoResult<Paged<Product>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE type = $1")
            .bind(product_type.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_products", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE type = $1 ORDER BY id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(product_type.as_str())
        .bind(i64::from(page.per_page))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        Ok(Paged {
            items: self.hydrate_products(&rows).await?,
            page: page.page,
            per_page: page.per_page,
            total: total.max(0) as u64,
        })
    }

    #[instrument(skip(self), err)]
    async fn get(&self, id: ProductId) -> RepoResult<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        match row {
            Some(row) => Ok(self.hydrate_products(std::slice::from_ref(&row)).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(
        skip(self, changes),
        fields(product_id = %changes.product.id, skus = changes.product.skus.len(), removed = changes.removed_skus.len()),
        err
    )]
    async fn save(&self, changes: &ProductChanges) -> RepoResult<()> {
        let product = &changes.product;
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        write_product(&mut tx, product).await?;

        if !changes.removed_skus.is_empty() {
            let removed: Vec<Uuid> = changes.removed_skus.iter().map(|id| *id.as_uuid()).collect();
            sqlx::query("DELETE FROM product_skus WHERE product_id = $1 AND id = ANY($2)")
                .bind(product.id.as_uuid())
                .bind(&removed)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_skus", e))?;
        }

        for sku in &product.skus {
            write_sku(&mut tx, sku).await?;
        }

        if let Some(campaign) = &product.crowdfunding {
            write_campaign(&mut tx, campaign).await?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[async_trait]
impl CategoryRepository for PgStore {
    #[instrument(skip(self), err)]
    async fn get(&self, id: CategoryId) -> RepoResult<Option<Category>> {
        let row = sqlx::query(
            "SELECT id, name, parent_id, is_directory, level, full_name FROM categories WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_category", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    #[instrument(skip(self, category), fields(category_id = %category.id), err)]
    async fn insert(&self, category: &Category) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, parent_id, is_directory, level, full_name)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(category.parent_id.map(Uuid::from))
        .bind(category.is_directory)
        .bind(to_i32(category.level, "level")?)
        .bind(&category.full_name)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn search(&self, query: &str, is_directory: Option<bool>, page: Page) -> RepoResult<Paged<Category>> {
        let pattern = like_pattern(query);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM categories
            WHERE full_name ILIKE $1 AND ($2::boolean IS NULL OR is_directory = $2)
            "#,
        )
        .bind(&pattern)
        .bind(is_directory)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_categories", e))?;

        let rows = sqlx::query(
            r#"
            SELECT id, name, parent_id, is_directory, level, full_name FROM categories
            WHERE full_name ILIKE $1 AND ($2::boolean IS NULL OR is_directory = $2)
            ORDER BY full_name
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&pattern)
        .bind(is_directory)
        .bind(i64::from(page.per_page))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_categories", e))?;

        Ok(Paged {
            items: rows.iter().map(category_from_row).collect::<RepoResult<_>>()?,
            page: page.page,
            per_page: page.per_page,
            total: total.max(0) as u64,
        })
    }
}

#[async_trait]
impl CrowdfundingRepository for PgStore {
    #[instrument(skip(self), err)]
    async fn due_for_finalization(&self, now: DateTime<Utc>) -> RepoResult<Vec<CrowdfundingProduct>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, target_amount, total_amount, user_count, end_at, status
            FROM crowdfunding_products
            WHERE status = 'funding' AND end_at <= $1
            ORDER BY end_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("due_for_finalization", e))?;
        rows.iter().map(campaign_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn get(&self, product_id: ProductId) -> RepoResult<Option<CrowdfundingProduct>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, target_amount, total_amount, user_count, end_at, status
            FROM crowdfunding_products
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_campaign", e))?;
        row.as_ref().map(campaign_from_row).transpose()
    }

    #[instrument(skip(self), fields(from = %from, to = %to), err)]
    async fn transition_status(
        &self,
        product_id: ProductId,
        from: CrowdfundingStatus,
        to: CrowdfundingStatus,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE crowdfunding_products
            SET status = $3
            WHERE product_id = $1 AND status = $2 AND end_at <= $4
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("transition_status", e))?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn awaiting_refund_job(&self) -> RepoResult<Vec<ProductId>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id
            FROM crowdfunding_products
            WHERE status = 'fail' AND refund_queued_at IS NULL
            ORDER BY end_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("awaiting_refund_job", e))?;
        rows.iter()
            .map(|row| column(row, "product_id").map(ProductId::from_uuid))
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn mark_refund_queued(&self, product_id: ProductId, at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE crowdfunding_products
            SET refund_queued_at = $2
            WHERE product_id = $1 AND refund_queued_at IS NULL
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_refund_queued", e))?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    #[instrument(skip(self, order), fields(order_no = %order.no), err)]
    async fn insert(&self, order: &Order) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(order.id.as_uuid())
        .bind(&order.no)
        .bind(order.order_type.as_str())
        .bind(order.user_id.as_uuid())
        .bind(order.total_amount)
        .bind(order.paid_at)
        .bind(&order.payment_method)
        .bind(&order.payment_no)
        .bind(order.refund_status.as_str())
        .bind(&order.refund_no)
        .bind(&order.refund_reason)
        .bind(order.closed)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, sku_id, amount, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line_no as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.sku_id.as_uuid())
            .bind(to_i32(item.amount, "amount")?)
            .bind(item.price)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn get(&self, id: OrderId) -> RepoResult<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;

        match row {
            Some(row) => Ok(self.hydrate_orders(std::slice::from_ref(&row)).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn refundable_crowdfunding_orders(&self, product_id: ProductId) -> RepoResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders o
            WHERE o.type = 'crowdfunding'
              AND o.paid_at IS NOT NULL
              AND o.refund_status <> 'success'
              AND EXISTS (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.product_id = $1)
            ORDER BY o.created_at, o.id
            "#
        ))
        .bind(product_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("refundable_crowdfunding_orders", e))?;
        self.hydrate_orders(&rows).await
    }

    #[instrument(skip(self, order), fields(order_no = %order.no, refund_status = %order.refund_status), err)]
    async fn update_refund(&self, order: &Order) -> RepoResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET refund_status = $2, refund_no = $3, refund_reason = $4 WHERE id = $1",
        )
        .bind(order.id.as_uuid())
        .bind(order.refund_status.as_str())
        .bind(&order.refund_no)
        .bind(&order.refund_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_refund", e))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!("order {} does not exist", order.no)));
        }
        Ok(())
    }
}

async fn write_product(tx: &mut Transaction<'_, Postgres>, product: &Product) -> RepoResult<()> {
    sqlx::query(
        r#"
        INSERT INTO products (id, type, category_id, title, description, image, on_sale, rating,
                              sold_count, review_count, price, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (id) DO UPDATE SET
            category_id = EXCLUDED.category_id,
            title = EXCLUDED.title,
            description = EXCLUDED.description,
            image = EXCLUDED.image,
            on_sale = EXCLUDED.on_sale,
            price = EXCLUDED.price,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(product.id.as_uuid())
    .bind(product.product_type.as_str())
    .bind(product.category_id.map(Uuid::from))
    .bind(&product.title)
    .bind(&product.description)
    .bind(&product.image)
    .bind(product.on_sale)
    .bind(product.rating)
    .bind(to_i64(product.sold_count, "sold_count")?)
    .bind(to_i64(product.review_count, "review_count")?)
    .bind(product.price)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_product", e))?;
    Ok(())
}

async fn write_sku(tx: &mut Transaction<'_, Postgres>, sku: &Sku) -> RepoResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO product_skus (id, product_id, title, description, price, stock)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE SET
            title = EXCLUDED.title,
            description = EXCLUDED.description,
            price = EXCLUDED.price,
            stock = EXCLUDED.stock
        WHERE product_skus.product_id = EXCLUDED.product_id
        "#,
    )
    .bind(sku.id.as_uuid())
    .bind(sku.product_id.as_uuid())
    .bind(&sku.title)
    .bind(&sku.description)
    .bind(sku.price)
    .bind(to_i32(sku.stock, "stock")?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_sku", e))?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Conflict(format!(
            "sku {} belongs to another product",
            sku.id
        )));
    }
    Ok(())
}

/// New campaigns are written whole; existing ones only take new terms, and only
/// while still funding.
async fn write_campaign(tx: &mut Transaction<'_, Postgres>, campaign: &CrowdfundingProduct) -> RepoResult<()> {
    sqlx::query(
        r#"
        INSERT INTO crowdfunding_products (product_id, target_amount, total_amount, user_count, end_at, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (product_id) DO UPDATE SET
            target_amount = EXCLUDED.target_amount,
            end_at = EXCLUDED.end_at
        WHERE crowdfunding_products.status = 'funding'
        "#,
    )
    .bind(campaign.product_id.as_uuid())
    .bind(campaign.target_amount)
    .bind(campaign.total_amount)
    .bind(to_i32(campaign.user_count, "user_count")?)
    .bind(campaign.end_at)
    .bind(campaign.status.as_str())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_campaign", e))?;
    Ok(())
}

fn product_from_row(row: &PgRow) -> RepoResult<Product> {
    Ok(Product {
        id: ProductId::from_uuid(column(row, "id")?),
        product_type: parse(column::<String>(row, "type")?, "type")?,
        category_id: column::<Option<Uuid>>(row, "category_id")?.map(CategoryId::from_uuid),
        title: column(row, "title")?,
        description: column(row, "description")?,
        image: column(row, "image")?,
        on_sale: column(row, "on_sale")?,
        rating: column(row, "rating")?,
        sold_count: to_u64(column(row, "sold_count")?, "sold_count")?,
        review_count: to_u64(column(row, "review_count")?, "review_count")?,
        price: column(row, "price")?,
        skus: Vec::new(),
        crowdfunding: None,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn sku_from_row(row: &PgRow) -> RepoResult<Sku> {
    Ok(Sku {
        id: column::<Uuid>(row, "id")?.into(),
        product_id: ProductId::from_uuid(column(row, "product_id")?),
        title: column(row, "title")?,
        description: column(row, "description")?,
        price: column(row, "price")?,
        stock: to_u32(column(row, "stock")?, "stock")?,
    })
}

fn campaign_from_row(row: &PgRow) -> RepoResult<CrowdfundingProduct> {
    Ok(CrowdfundingProduct {
        product_id: ProductId::from_uuid(column(row, "product_id")?),
        target_amount: column(row, "target_amount")?,
        total_amount: column(row, "total_amount")?,
        user_count: to_u32(column(row, "user_count")?, "user_count")?,
        end_at: column(row, "end_at")?,
        status: parse(column::<String>(row, "status")?, "status")?,
    })
}

fn category_from_row(row: &PgRow) -> RepoResult<Category> {
    Ok(Category {
        id: CategoryId::from_uuid(column(row, "id")?),
        name: column(row, "name")?,
        parent_id: column::<Option<Uuid>>(row, "parent_id")?.map(CategoryId::from_uuid),
        is_directory: column(row, "is_directory")?,
        level: to_u32(column(row, "level")?, "level")?,
        full_name: column(row, "full_name")?,
    })
}

fn order_from_row(row: &PgRow) -> RepoResult<Order> {
    Ok(Order {
        id: OrderId::from_uuid(column(row, "id")?),
        no: column(row, "no")?,
        order_type: parse(column::<String>(row, "type")?, "type")?,
        user_id: column::<Uuid>(row, "user_id")?.into(),
        items: Vec::new(),
        total_amount: column(row, "total_amount")?,
        paid_at: column(row, "paid_at")?,
        payment_method: column(row, "payment_method")?,
        payment_no: column(row, "payment_no")?,
        refund_status: parse(column::<String>(row, "refund_status")?, "refund_status")?,
        refund_no: column(row, "refund_no")?,
        refund_reason: column(row, "refund_reason")?,
        closed: column(row, "closed")?,
        created_at: column(row, "created_at")?,
    })
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> RepoResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(name)
        .map_err(|e| RepositoryError::Corrupt(format!("{name}: {e}")))
}

fn parse<T>(value: String, name: &str) -> RepoResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| RepositoryError::Corrupt(format!("{name}: {e}")))
}

fn to_u32(value: i32, name: &str) -> RepoResult<u32> {
    u32::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("{name} is negative: {value}")))
}

fn to_u64(value: i64, name: &str) -> RepoResult<u64> {
    u64::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("{name} is negative: {value}")))
}

fn to_i32(value: u32, name: &str) -> RepoResult<i32> {
    i32::try_from(value).map_err(|_| RepositoryError::Conflict(format!("{name} is out of range: {value}")))
}

fn to_i64(value: u64, name: &str) -> RepoResult<i64> {
    i64::try_from(value).map_err(|_| RepositoryError::Conflict(format!("{name} is out of range: {value}")))
}

/// `ILIKE` pattern matching `query` anywhere, with wildcards in the query escaped.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            // unique_violation, foreign_key_violation, check_violation
            Some("23505") | Some("23503") | Some("23514") => {
                RepositoryError::Conflict(format!("{operation}: {}", db_err.message()))
            }
            _ => RepositoryError::Storage(format!("database error in {operation}: {}", db_err.message())),
        },
        sqlx::Error::PoolClosed => RepositoryError::Storage(format!("connection pool closed in {operation}")),
        other => RepositoryError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" phone "), "%phone%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn negative_counters_are_corrupt() {
        assert!(matches!(to_u32(-1, "stock"), Err(RepositoryError::Corrupt(_))));
        assert_eq!(to_u64(7, "sold_count"), Ok(7));
    }
}
