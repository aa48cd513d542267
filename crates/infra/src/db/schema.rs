//! Idempotent schema, applied at startup.

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id           UUID PRIMARY KEY,
        name         TEXT NOT NULL,
        parent_id    UUID NULL REFERENCES categories (id),
        is_directory BOOLEAN NOT NULL DEFAULT FALSE,
        level        INTEGER NOT NULL DEFAULT 0,
        full_name    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id           UUID PRIMARY KEY,
        type         TEXT NOT NULL DEFAULT 'normal',
        category_id  UUID NULL REFERENCES categories (id),
        title        TEXT NOT NULL,
        description  TEXT NOT NULL,
        image        TEXT NOT NULL,
        on_sale      BOOLEAN NOT NULL DEFAULT TRUE,
        rating       NUMERIC(4, 2) NOT NULL DEFAULT 5,
        sold_count   BIGINT NOT NULL DEFAULT 0,
        review_count BIGINT NOT NULL DEFAULT 0,
        price        NUMERIC(12, 2) NOT NULL,
        created_at   TIMESTAMPTZ NOT NULL,
        updated_at   TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS products_type_idx ON products (type, id DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS product_skus (
        id          UUID PRIMARY KEY,
        product_id  UUID NOT NULL REFERENCES products (id) ON DELETE CASCADE,
        title       TEXT NOT NULL,
        description TEXT NOT NULL,
        price       NUMERIC(12, 2) NOT NULL CHECK (price > 0),
        stock       INTEGER NOT NULL CHECK (stock >= 0)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS product_skus_product_idx ON product_skus (product_id)",
    r#"
    CREATE TABLE IF NOT EXISTS crowdfunding_products (
        product_id    UUID PRIMARY KEY REFERENCES products (id) ON DELETE CASCADE,
        target_amount NUMERIC(12, 2) NOT NULL,
        total_amount  NUMERIC(12, 2) NOT NULL DEFAULT 0,
        user_count    INTEGER NOT NULL DEFAULT 0,
        end_at        TIMESTAMPTZ NOT NULL,
        status        TEXT NOT NULL DEFAULT 'funding'
    )
    "#,
    "CREATE INDEX IF NOT EXISTS crowdfunding_products_due_idx ON crowdfunding_products (status, end_at)",
    // Set once the refund job of a failed campaign is in the job queue.
    "ALTER TABLE crowdfunding_products ADD COLUMN IF NOT EXISTS refund_queued_at TIMESTAMPTZ NULL",
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id             UUID PRIMARY KEY,
        no             TEXT NOT NULL UNIQUE,
        user_id        UUID NOT NULL,
        total_amount   NUMERIC(12, 2) NOT NULL,
        paid_at        TIMESTAMPTZ NULL,
        payment_method TEXT NULL,
        payment_no     TEXT NULL,
        refund_status  TEXT NOT NULL DEFAULT 'pending',
        refund_no      TEXT NULL UNIQUE,
        refund_reason  TEXT NULL,
        closed         BOOLEAN NOT NULL DEFAULT FALSE,
        created_at     TIMESTAMPTZ NOT NULL
    )
    "#,
    // Orders that predate the type column are normal orders.
    "ALTER TABLE orders ADD COLUMN IF NOT EXISTS type TEXT NOT NULL DEFAULT 'normal'",
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        order_id   UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        line_no    INTEGER NOT NULL,
        product_id UUID NOT NULL,
        sku_id     UUID NOT NULL,
        amount     INTEGER NOT NULL,
        price      NUMERIC(12, 2) NOT NULL,
        PRIMARY KEY (order_id, line_no)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS order_items_product_idx ON order_items (product_id)",
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id           UUID PRIMARY KEY,
        kind         TEXT NOT NULL,
        status       TEXT NOT NULL,
        scheduled_at TIMESTAMPTZ NULL,
        created_at   TIMESTAMPTZ NOT NULL,
        updated_at   TIMESTAMPTZ NOT NULL,
        body         JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS jobs_claim_idx ON jobs (status, scheduled_at, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS dead_letter_jobs (
        job_id           UUID PRIMARY KEY,
        kind             TEXT NOT NULL,
        reason           TEXT NOT NULL,
        dead_lettered_at TIMESTAMPTZ NOT NULL,
        body             JSONB NOT NULL
    )
    "#,
];

/// Create missing tables, columns and indexes. Safe to run on every start.
pub async fn apply(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
