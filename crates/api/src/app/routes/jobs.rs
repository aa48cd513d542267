//! Operator endpoints for the background job queue.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use uuid::Uuid;

use backoffice_infra::jobs::JobId;

use crate::app::{dto, errors, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/stats", get(job_stats))
        .route("/dead-letters", get(list_dead_letters))
        .route("/dead-letters/:id/retry", post(retry_dead_letter))
        .route("/dead-letters/:id", delete(delete_dead_letter))
}

pub async fn job_stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.stores.jobs.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

pub async fn list_dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::LimitQuery>,
) -> axum::response::Response {
    match services.stores.jobs.list_dead_letters(query.limit()).await {
        Ok(entries) => {
            let items: Vec<dto::DeadLetterView> = entries.into_iter().map(Into::into).collect();
            Json(serde_json::json!({ "items": items })).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

pub async fn retry_dead_letter(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match dto::parse_id::<Uuid>(&id, "job") {
        Ok(v) => JobId::from_uuid(v),
        Err(resp) => return resp,
    };
    match services.stores.jobs.retry_dead_letter(job_id).await {
        Ok(job) => {
            tracing::info!(job_id = %job.id, kind = job.kind.type_name(), "dead-lettered job requeued");
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "job_id": job.id.to_string(),
                    "kind": job.kind.type_name(),
                    "status": job.status.label(),
                })),
            )
                .into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

pub async fn delete_dead_letter(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match dto::parse_id::<Uuid>(&id, "job") {
        Ok(v) => JobId::from_uuid(v),
        Err(resp) => return resp,
    };
    match services.stores.jobs.delete_dead_letter(job_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}
