//! Permissive field coercion shared by every Mongo read path.
//!
//! Monetary fields in the source documents are typed loosely (string or
//! number); date fields arrive as ISO strings or native BSON dates. Per
//! `SPEC_FULL.md` §3/§9, coercion is centralized here and never trusted
//! downstream: any error or null becomes `0.0` for money, `None` for dates.

use bson::{Bson, Document};
use chrono::{DateTime, Utc};

pub fn money(doc: &Document, key: &str) -> f64 {
    match doc.get(key) {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => *v as f64,
        Some(Bson::Int64(v)) => *v as f64,
        Some(Bson::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Bson::Decimal128(d)) => d.to_string().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn opt_str(doc: &Document, key: &str) -> Option<String> {
    match doc.get(key) {
        Some(Bson::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

pub fn req_str(doc: &Document, key: &str) -> String {
    opt_str(doc, key).unwrap_or_default()
}

pub fn opt_bool(doc: &Document, key: &str, default: bool) -> bool {
    match doc.get(key) {
        Some(Bson::Boolean(b)) => *b,
        _ => default,
    }
}

pub fn opt_datetime(doc: &Document, key: &str) -> Option<DateTime<Utc>> {
    match doc.get(key) {
        Some(Bson::DateTime(dt)) => Some(dt.to_chrono()),
        Some(Bson::String(s)) => parse_flexible_date(s),
        _ => None,
    }
}

/// Accepts either a full RFC 3339 timestamp or a bare `YYYY-MM-DD` calendar
/// date (treated as midnight UTC), since both appear in the source data.
pub fn parse_flexible_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn money_coerces_strings_and_defaults_on_missing() {
        let doc = doc! { "feeBilled": "150.50", "missing_field": Bson::Null };
        assert_eq!(money(&doc, "feeBilled"), 150.50);
        assert_eq!(money(&doc, "allowedAmount"), 0.0);
        assert_eq!(money(&doc, "missing_field"), 0.0);
    }

    #[test]
    fn parse_flexible_date_accepts_calendar_date_and_rfc3339() {
        assert!(parse_flexible_date("2024-02-01").is_some());
        assert!(parse_flexible_date("2024-02-01T10:00:00Z").is_some());
        assert!(parse_flexible_date("not-a-date").is_none());
    }
}
