use axum::{routing::get, Router};

use backoffice_catalog::{CrowdfundingProducts, NormalProducts};

pub mod categories;
pub mod jobs;
pub mod products;
pub mod system;

/// Router for the admin back office.
pub fn router() -> Router {
    Router::new()
        .nest("/admin/products", products::router::<NormalProducts>())
        .nest("/admin/crowdfunding_products", products::router::<CrowdfundingProducts>())
        .route("/admin/api/categories", get(categories::search_categories))
        .nest("/admin/jobs", jobs::router())
}
