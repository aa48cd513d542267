use serde::{Deserialize, Serialize};

use backoffice_infra::jobs::DeadLetterEntry;
use backoffice_infra::repository::Page;

use crate::app::errors;

// -------------------------
// Query DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        let defaults = Page::default();
        Page::new(
            self.page.unwrap_or(defaults.page),
            self.per_page.unwrap_or(defaults.per_page),
        )
    }
}

/// Remote picker query: `?q=&is_directory=0&page=`.
#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    pub q: Option<String>,
    pub is_directory: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(50).clamp(1, 500)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct DeadLetterView {
    pub job_id: String,
    pub kind: String,
    pub reason: String,
    pub attempts: u32,
    pub dead_lettered_at: chrono::DateTime<chrono::Utc>,
    pub payload: serde_json::Value,
}

impl From<DeadLetterEntry> for DeadLetterView {
    fn from(entry: DeadLetterEntry) -> Self {
        Self {
            job_id: entry.job.id.to_string(),
            kind: entry.job.kind.type_name().to_string(),
            reason: entry.reason,
            attempts: entry.job.attempt,
            dead_lettered_at: entry.dead_lettered_at,
            payload: entry.job.payload,
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

/// `0`/`1` (or `false`/`true`) filter flag; absent or blank means no filter.
pub fn parse_flag(name: &str, value: Option<&str>) -> Result<Option<bool>, axum::response::Response> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some("1") | Some("true") => Ok(Some(true)),
        Some("0") | Some("false") => Ok(Some(false)),
        Some(_) => Err(errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_query",
            format!("{name} must be 0 or 1"),
        )),
    }
}

pub fn parse_id<T>(id: &str, what: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr,
{
    id.parse().map_err(|_| {
        errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_numeric_and_boolean_forms() {
        assert_eq!(parse_flag("is_directory", Some("0")).unwrap(), Some(false));
        assert_eq!(parse_flag("is_directory", Some("true")).unwrap(), Some(true));
        assert_eq!(parse_flag("is_directory", Some(" ")).unwrap(), None);
        assert!(parse_flag("is_directory", Some("maybe")).is_err());
    }

    #[test]
    fn page_query_falls_back_to_defaults() {
        assert_eq!(PageQuery::default().page(), Page::default());
        let q = PageQuery {
            page: Some(0),
            per_page: Some(5),
        };
        assert_eq!(q.page(), Page::new(1, 5));
    }
}
