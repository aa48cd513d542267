//! Product admin screens, mounted once per variant.
//!
//! Handlers are generic over the variant; the router for `V` only ever sees the
//! `ProductAdmin<V>` extension, so a product of another type answers 404.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use backoffice_catalog::{ProductForm, ProductVariant};
use backoffice_core::ProductId;
use backoffice_infra::admin::ProductAdmin;
use backoffice_infra::repository::Paged;

use crate::app::{dto, errors};

pub fn router<V: ProductVariant>() -> Router {
    Router::new()
        .route("/", get(list_products::<V>).post(create_product::<V>))
        .route("/schema", get(schema::<V>))
        .route("/:id", get(get_product::<V>).put(update_product::<V>))
}

pub async fn list_products<V: ProductVariant>(
    Extension(admin): Extension<Arc<ProductAdmin<V>>>,
    Query(query): Query<dto::PageQuery>,
) -> axum::response::Response {
    let page = match admin.list(query.page()).await {
        Ok(p) => p,
        Err(e) => return errors::admin_error_to_response(e),
    };
    let Paged {
        items,
        page,
        per_page,
        total,
    } = page;
    match admin.records(items).await {
        Ok(records) => Json(Paged {
            items: records,
            page,
            per_page,
            total,
        })
        .into_response(),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn create_product<V: ProductVariant>(
    Extension(admin): Extension<Arc<ProductAdmin<V>>>,
    Json(form): Json<ProductForm>,
) -> axum::response::Response {
    let product = match admin.create(&form).await {
        Ok(p) => p,
        Err(e) => return errors::admin_error_to_response(e),
    };
    match admin.record(product).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn get_product<V: ProductVariant>(
    Extension(admin): Extension<Arc<ProductAdmin<V>>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ProductId = match dto::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product = match admin.get(id).await {
        Ok(p) => p,
        Err(e) => return errors::admin_error_to_response(e),
    };
    match admin.record(product).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn update_product<V: ProductVariant>(
    Extension(admin): Extension<Arc<ProductAdmin<V>>>,
    Path(id): Path<String>,
    Json(form): Json<ProductForm>,
) -> axum::response::Response {
    let id: ProductId = match dto::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let product = match admin.update(id, &form).await {
        Ok(p) => p,
        Err(e) => return errors::admin_error_to_response(e),
    };
    match admin.record(product).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::admin_error_to_response(e),
    }
}

pub async fn schema<V: ProductVariant>(Extension(admin): Extension<Arc<ProductAdmin<V>>>) -> axum::response::Response {
    Json(admin.schema()).into_response()
}
