use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    response::IntoResponse,
    Json,
};

use crate::app::{dto, errors, services::AppServices};

/// Remote data source for the category select on product forms.
pub async fn search_categories(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::CategoryQuery>,
) -> axum::response::Response {
    let is_directory = match dto::parse_flag("is_directory", query.is_directory.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let q = query.q.as_deref().unwrap_or("").trim();

    match services
        .category_lookup
        .search(q, is_directory, query.page.unwrap_or(1))
        .await
    {
        Ok(options) => Json(options).into_response(),
        Err(e) => errors::admin_error_to_response(e),
    }
}
