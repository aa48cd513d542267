//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backends, admin screens, finalizer and job executor
//! - `routes/`: HTTP routes + handlers (one file per admin area)
//! - `dto.rs`: query DTOs and parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use services::AppServices;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let admin = routes::router()
        .layer(Extension(services.normal_products.clone()))
        .layer(Extension(services.crowdfunding_products.clone()))
        .layer(Extension(services));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(admin)
        .layer(ServiceBuilder::new())
}
