//! Filter Normalizer (C1).
//!
//! Accepts a raw query string in any of the three array-parameter forms the
//! dashboards and CSV exporters use (`k[]=v`, `k=a,b`, repeated `k=a&k=b`) and
//! produces the canonical filter records consumed by the pivot and
//! credentialing engines. Parsing never fails: illegible input degrades to an
//! absent or defaulted field rather than an error.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use super::models::{CredentialingFilter, PivotFilter, ProviderStatusKind};

/// An ordered multimap of query parameters, preserving the order values
/// appeared in for a given key.
#[derive(Debug, Clone, Default)]
pub struct ParamBag {
    entries: BTreeMap<String, Vec<String>>,
}

impl ParamBag {
    pub fn parse(raw_query: &str) -> Self {
        let mut entries: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in url::form_urlencoded::parse(raw_query.trim_start_matches('?').as_bytes())
        {
            entries
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        Self { entries }
    }

    fn get_all(&self, key: &str) -> Option<&Vec<String>> {
        self.entries.get(key)
    }

    /// Resolves an array-valued parameter per the documented precedence:
    /// `N[]` wins, then a repeated `N`, then a comma-split single `N`, then a
    /// one-element wrap. Absence of all forms yields `None`.
    pub fn resolve_array(&self, name: &str) -> Option<Vec<String>> {
        let bracketed_key = format!("{name}[]");
        if let Some(values) = self.get_all(&bracketed_key) {
            if !values.is_empty() {
                return Some(values.clone());
            }
        }

        if let Some(values) = self.get_all(name) {
            if values.len() > 1 {
                return Some(values.clone());
            }
            if let Some(single) = values.first() {
                if single.contains(',') {
                    return Some(single.split(',').map(str::to_string).collect());
                }
                return Some(vec![single.clone()]);
            }
        }

        None
    }

    pub fn resolve_string(&self, name: &str) -> Option<String> {
        self.get_all(name).and_then(|values| values.first().cloned())
    }

    pub fn resolve_bool(&self, name: &str, default: bool) -> bool {
        match self.resolve_string(name) {
            Some(value) => value == "true",
            None => default,
        }
    }

    pub fn resolve_int(&self, name: &str, default: i64) -> i64 {
        self.resolve_string(name)
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(default)
    }

    pub fn resolve_date(&self, name: &str) -> Option<NaiveDate> {
        self.resolve_string(name)
            .and_then(|value| NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok())
    }
}

pub fn normalize_pivot_filter(bag: &ParamBag) -> PivotFilter {
    let defaults = PivotFilter::defaults();
    PivotFilter {
        start: bag.resolve_date("start"),
        end: bag.resolve_date("end"),
        locations: bag.resolve_array("locations"),
        carriers: bag.resolve_array("carriers"),
        procedures: bag.resolve_array("procedures"),
        min_count: bag.resolve_int("minCount", defaults.min_count),
        page: bag.resolve_int("page", defaults.page),
        limit: bag.resolve_int("limit", defaults.limit),
    }
}

pub fn normalize_credentialing_filter(bag: &ParamBag) -> CredentialingFilter {
    CredentialingFilter {
        start: bag.resolve_date("start"),
        end: bag.resolve_date("end"),
        locations: bag.resolve_array("locations"),
        carriers: bag.resolve_array("carriers"),
        status: bag
            .resolve_string("status")
            .map(|value| ProviderStatusKind::parse(&value)),
        issues_only: bag.resolve_bool("issuesOnly", false),
    }
}

/// Canonical, key-ordered serialization of a pivot filter used both as the
/// cache fingerprint input and as the round-trip target for the idempotence
/// property: `normalize(serialize(normalize(x))) == normalize(x)`.
pub fn canonical_pivot_filter(filter: &PivotFilter) -> String {
    let mut parts = Vec::new();
    if let Some(start) = filter.start {
        parts.push(format!("start={start}"));
    }
    if let Some(end) = filter.end {
        parts.push(format!("end={end}"));
    }
    if let Some(locations) = &filter.locations {
        parts.push(format!("locations={}", locations.join(",")));
    }
    if let Some(carriers) = &filter.carriers {
        parts.push(format!("carriers={}", carriers.join(",")));
    }
    if let Some(procedures) = &filter.procedures {
        parts.push(format!("procedures={}", procedures.join(",")));
    }
    parts.push(format!("minCount={}", filter.min_count));
    parts.push(format!("page={}", filter.page));
    parts.push(format!("limit={}", filter.limit));
    parts.sort();
    parts.join("&")
}

pub fn canonical_credentialing_filter(filter: &CredentialingFilter) -> String {
    let mut parts = Vec::new();
    if let Some(start) = filter.start {
        parts.push(format!("start={start}"));
    }
    if let Some(end) = filter.end {
        parts.push(format!("end={end}"));
    }
    if let Some(locations) = &filter.locations {
        parts.push(format!("locations={}", locations.join(",")));
    }
    if let Some(carriers) = &filter.carriers {
        parts.push(format!("carriers={}", carriers.join(",")));
    }
    if let Some(status) = &filter.status {
        parts.push(format!("status={}", status.as_str()));
    }
    parts.push(format!("issuesOnly={}", filter.issues_only));
    parts.sort();
    parts.join("&")
}
