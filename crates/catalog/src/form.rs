//! Admin product form input and field-level parsing.
//!
//! Admin form posts are loosely typed: numbers may arrive as JSON numbers or as
//! strings, flags as booleans, `0`/`1` or `"0"`/`"1"`. Parsing therefore happens
//! field by field so that every problem is reported against its field path.

use core::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use backoffice_core::{CategoryId, FieldErrors, SkuId};

/// File extensions accepted for cover images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "svg", "webp"];

/// A scalar form value as submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl FormValue {
    fn as_text(&self) -> String {
        match self {
            FormValue::Bool(b) => b.to_string(),
            FormValue::Number(n) => n.to_string(),
            FormValue::Text(s) => s.trim().to_string(),
        }
    }

    /// Truthiness used for flags (`on_sale`, `_remove_`).
    pub fn is_set(&self) -> bool {
        match self {
            FormValue::Bool(b) => *b,
            FormValue::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            FormValue::Text(s) => matches!(s.trim(), "1" | "true" | "on" | "yes"),
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<i64> for FormValue {
    fn from(value: i64) -> Self {
        FormValue::Number(value.into())
    }
}

impl From<bool> for FormValue {
    fn from(value: bool) -> Self {
        FormValue::Bool(value)
    }
}

/// Product edit form (shared by every product variant).
///
/// There is deliberately no `type` field: the variant serving the request decides it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductForm {
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub category_id: Option<CategoryId>,
    pub on_sale: Option<FormValue>,
    pub skus: Vec<SkuRow>,
    pub crowdfunding: Option<CrowdfundingInput>,
}

impl ProductForm {
    pub fn on_sale(&self) -> bool {
        self.on_sale.as_ref().is_some_and(FormValue::is_set)
    }
}

/// One row of the nested SKU sub-form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkuRow {
    /// Present when the row edits an existing SKU.
    pub id: Option<SkuId>,
    pub title: String,
    pub description: String,
    pub price: Option<FormValue>,
    pub stock: Option<FormValue>,
    /// Removal flag of the nested form.
    #[serde(rename = "_remove_")]
    pub remove: Option<FormValue>,
}

impl SkuRow {
    pub fn is_removed(&self) -> bool {
        self.remove.as_ref().is_some_and(FormValue::is_set)
    }
}

/// Crowdfunding-only form fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrowdfundingInput {
    pub target_amount: Option<FormValue>,
    pub end_at: Option<String>,
}

pub(crate) fn required_text(errors: &mut FieldErrors, field: &str, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, "is required");
        return None;
    }
    Some(value.to_string())
}

/// Numeric and strictly positive (prices, campaign targets).
pub(crate) fn positive_decimal(errors: &mut FieldErrors, field: &str, value: Option<&FormValue>) -> Option<Decimal> {
    let Some(text) = present(value) else {
        errors.add(field, "is required");
        return None;
    };
    let parsed = Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text));
    match parsed {
        Ok(d) if d > Decimal::ZERO => Some(d.normalize()),
        Ok(_) => {
            errors.add(field, "must be greater than 0");
            None
        }
        Err(_) => {
            errors.add(field, "must be a number");
            None
        }
    }
}

/// Integer and not negative (stock).
pub(crate) fn non_negative_integer(errors: &mut FieldErrors, field: &str, value: Option<&FormValue>) -> Option<u32> {
    let Some(text) = present(value) else {
        errors.add(field, "is required");
        return None;
    };
    match text.parse::<i64>() {
        Ok(n) if n < 0 => {
            errors.add(field, "must be at least 0");
            None
        }
        Ok(n) => match u32::try_from(n) {
            Ok(n) => Some(n),
            Err(_) => {
                errors.add(field, "is too large");
                None
            }
        },
        Err(_) => {
            errors.add(field, "must be an integer");
            None
        }
    }
}

pub(crate) fn image_path(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<String> {
    let Some(path) = value.map(str::trim).filter(|p| !p.is_empty()) else {
        errors.add(field, "is required");
        return None;
    };
    if !is_image(path) {
        errors.add(field, format!("must be an image ({})", IMAGE_EXTENSIONS.join(", ")));
        return None;
    }
    Some(path.to_string())
}

pub(crate) fn date_time(errors: &mut FieldErrors, field: &str, value: Option<&str>) -> Option<DateTime<Utc>> {
    let Some(text) = value.map(str::trim).filter(|t| !t.is_empty()) else {
        errors.add(field, "is required");
        return None;
    };
    let parsed = parse_date_time(text);
    if parsed.is_none() {
        errors.add(field, "must be a valid date");
    }
    parsed
}

/// Whether `path` names an image file, judged by its extension (query strings ignored).
pub fn is_image(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`; zone-less values are UTC.
pub fn parse_date_time(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn present(value: Option<&FormValue>) -> Option<String> {
    value.map(FormValue::as_text).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use rust_decimal_macros::dec;

    #[test]
    fn decimals_accept_numbers_and_strings() {
        let mut errors = FieldErrors::new();
        assert_eq!(positive_decimal(&mut errors, "price", Some(&"19.90".into())), Some(dec!(19.9)));
        let number: FormValue = serde_json::from_str("9.9").unwrap();
        assert_eq!(positive_decimal(&mut errors, "price", Some(&number)), Some(dec!(9.9)));
        assert!(errors.is_empty());
    }

    #[test]
    fn decimals_reject_zero_negative_and_garbage() {
        let mut errors = FieldErrors::new();
        assert_eq!(positive_decimal(&mut errors, "a", Some(&"0".into())), None);
        assert_eq!(positive_decimal(&mut errors, "b", Some(&"-3".into())), None);
        assert_eq!(positive_decimal(&mut errors, "c", Some(&"ten".into())), None);
        assert_eq!(positive_decimal(&mut errors, "d", None), None);

        assert_eq!(errors.get("a").unwrap(), ["must be greater than 0"]);
        assert_eq!(errors.get("b").unwrap(), ["must be greater than 0"]);
        assert_eq!(errors.get("c").unwrap(), ["must be a number"]);
        assert_eq!(errors.get("d").unwrap(), ["is required"]);
    }

    #[test]
    fn stock_must_be_a_non_negative_integer() {
        let mut errors = FieldErrors::new();
        assert_eq!(non_negative_integer(&mut errors, "ok", Some(&0i64.into())), Some(0));
        assert_eq!(non_negative_integer(&mut errors, "ok2", Some(&"12".into())), Some(12));
        assert_eq!(non_negative_integer(&mut errors, "neg", Some(&(-1i64).into())), None);
        assert_eq!(non_negative_integer(&mut errors, "frac", Some(&"1.5".into())), None);

        assert!(!errors.contains("ok") && !errors.contains("ok2"));
        assert_eq!(errors.get("neg").unwrap(), ["must be at least 0"]);
        assert_eq!(errors.get("frac").unwrap(), ["must be an integer"]);
    }

    #[test]
    fn image_extensions() {
        assert!(is_image("images/cover.PNG"));
        assert!(is_image("https://cdn.example.com/a/b.webp?v=3"));
        assert!(!is_image("images/cover.pdf"));
        assert!(!is_image("images/.png"));
        assert!(!is_image("cover"));
    }

    #[test]
    fn date_formats() {
        let dt = parse_date_time("2026-11-01 12:30:00").unwrap();
        assert_eq!((dt.month(), dt.day(), dt.hour(), dt.minute()), (11, 1, 12, 30));

        let dt = parse_date_time("2026-11-01T12:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 10);

        let dt = parse_date_time("2026-11-01").unwrap();
        assert_eq!(dt.hour(), 0);

        assert!(parse_date_time("next friday").is_none());
    }

    #[test]
    fn flags_accept_form_encodings() {
        assert!(FormValue::from("1").is_set());
        assert!(FormValue::from(true).is_set());
        assert!(FormValue::from(1i64).is_set());
        assert!(!FormValue::from("0").is_set());
        assert!(!FormValue::from(0i64).is_set());
    }

    #[test]
    fn sku_row_deserializes_remove_flag() {
        let row: SkuRow = serde_json::from_value(serde_json::json!({
            "title": "Red",
            "description": "Red one",
            "price": "15.00",
            "stock": 3,
            "_remove_": 1,
        }))
        .unwrap();
        assert!(row.is_removed());
        assert_eq!(row.price, Some(FormValue::Text("15.00".to_string())));
    }
}
