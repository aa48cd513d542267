//! Postgres connection pool and schema.

pub mod schema;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::AppConfig;

/// Connect to `url` and apply the schema.
pub async fn connect(url: &str, config: &AppConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(url)
        .await?;
    schema::apply(&pool).await?;
    info!(max_connections = config.db_max_connections, "database ready");
    Ok(pool)
}
