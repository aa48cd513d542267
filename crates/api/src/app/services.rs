use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use backoffice_catalog::{CrowdfundingProducts, NormalProducts};
use backoffice_infra::admin::{CategoryLookup, ProductAdmin};
use backoffice_infra::config::AppConfig;
use backoffice_infra::crowdfunding::{CrowdfundingFinalizer, LoggingRefundGateway, RefundOrdersHandler};
use backoffice_infra::db;
use backoffice_infra::jobs::{InMemoryJobStore, JobExecutor, JobKind, JobStore, PostgresJobStore, RetryPolicy};
use backoffice_infra::repository::{
    CategoryRepository, CrowdfundingRepository, InMemoryStore, OrderRepository, PgStore, ProductRepository,
};
use backoffice_sales::RefundGateway;

/// Storage backends behind the services.
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub campaigns: Arc<dyn CrowdfundingRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub jobs: Arc<dyn JobStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            products: store.clone(),
            categories: store.clone(),
            campaigns: store.clone(),
            orders: store,
            jobs: InMemoryJobStore::arc(),
        }
    }

    pub fn postgres(pool: PgPool, job_lease: Duration) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));
        Self {
            products: store.clone(),
            categories: store.clone(),
            campaigns: store.clone(),
            orders: store,
            jobs: Arc::new(PostgresJobStore::new(pool).with_lease(job_lease)),
        }
    }
}

/// Everything the HTTP handlers and background tasks share.
#[derive(Clone)]
pub struct AppServices {
    pub config: AppConfig,
    pub stores: Stores,
    pub normal_products: Arc<ProductAdmin<NormalProducts>>,
    pub crowdfunding_products: Arc<ProductAdmin<CrowdfundingProducts>>,
    pub category_lookup: Arc<CategoryLookup>,
    pub finalizer: Arc<CrowdfundingFinalizer>,
    refund_gateway: Arc<dyn RefundGateway>,
}

impl AppServices {
    pub fn new(config: AppConfig, stores: Stores) -> Self {
        let finalizer = CrowdfundingFinalizer::new(stores.campaigns.clone(), stores.jobs.clone())
            .with_refund_policy(refund_policy(&config));
        Self {
            normal_products: Arc::new(ProductAdmin::new(
                NormalProducts,
                stores.products.clone(),
                stores.categories.clone(),
            )),
            crowdfunding_products: Arc::new(ProductAdmin::new(
                CrowdfundingProducts,
                stores.products.clone(),
                stores.categories.clone(),
            )),
            category_lookup: Arc::new(CategoryLookup::new(stores.categories.clone())),
            finalizer: Arc::new(finalizer),
            refund_gateway: Arc::new(LoggingRefundGateway),
            config,
            stores,
        }
    }

    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(config, Stores::in_memory())
    }

    /// Postgres when `DATABASE_URL` is set, in-memory stores otherwise.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        if config.database_url.is_none() {
            tracing::warn!("DATABASE_URL not set; using in-memory stores (data is lost on exit)");
            return Ok(Self::in_memory(config));
        }
        Self::from_database(config).await
    }

    /// Postgres-backed services; fails without `DATABASE_URL`.
    pub async fn from_database(config: AppConfig) -> anyhow::Result<Self> {
        let Some(url) = config.database_url.clone() else {
            anyhow::bail!("DATABASE_URL is not set");
        };
        let pool = db::connect(&url, &config).await?;
        let stores = Stores::postgres(pool, config.job_lease);
        Ok(Self::new(config, stores))
    }

    pub fn with_refund_gateway(mut self, gateway: Arc<dyn RefundGateway>) -> Self {
        self.refund_gateway = gateway;
        self
    }

    /// Executor with every job handler of the application registered.
    pub fn job_executor(&self) -> JobExecutor {
        let mut executor = JobExecutor::new(self.stores.jobs.clone());
        executor.register_handler(
            JobKind::REFUND_CROWDFUNDING_ORDERS,
            Arc::new(RefundOrdersHandler::new(
                self.stores.campaigns.clone(),
                self.stores.orders.clone(),
                self.refund_gateway.clone(),
            )),
        );
        executor
    }
}

/// Refund jobs back off exponentially from 5s up to 10 minutes.
pub fn refund_policy(config: &AppConfig) -> RetryPolicy {
    RetryPolicy::exponential(
        config.refund_max_attempts.max(1),
        Duration::from_secs(5),
        Duration::from_secs(600),
    )
}
