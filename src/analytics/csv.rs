//! CSV Serializer (C3): RFC 4180 escaping with the two surfaces' fixed,
//! contractual column orders.

use super::models::{CredentialingRow, PivotRow};

const NO_DATA_BODY: &str = "No data available";

pub const PIVOT_COLUMNS: [&str; 15] = [
    "carrier",
    "locationId",
    "locationCode",
    "locationName",
    "procedure",
    "month",
    "billed",
    "allowed",
    "paid",
    "writeOff",
    "writeOffPct",
    "feeScheduled",
    "scheduleVariance",
    "claimCount",
    "hasIssues",
];

pub const CREDENTIALING_COLUMNS: [&str; 17] = [
    "provider_npi",
    "provider_name",
    "tin",
    "location_id",
    "carrier",
    "plan",
    "status",
    "effective_date",
    "term_date",
    "last_verified_at",
    "verification_source",
    "source_url",
    "notes",
    "is_manual_override",
    "override_by",
    "override_at",
    "alerts",
];

/// Escapes a single CSV field per RFC 4180: wrap in quotes and double any
/// internal quote if the raw text contains a comma, quote, or line break.
pub fn escape_field(raw: &str) -> String {
    if raw.contains(',') || raw.contains('"') || raw.contains('\n') || raw.contains('\r') {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn number_field(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let mut formatted = format!("{value}");
        if !formatted.contains('.') && !formatted.contains('e') {
            formatted.push_str(".0");
        }
        formatted
    }
}

fn optional_number_field(value: Option<f64>) -> String {
    value.map(number_field).unwrap_or_default()
}

fn bool_field(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

pub fn pivot_to_csv(rows: &[PivotRow]) -> String {
    if rows.is_empty() {
        return NO_DATA_BODY.to_string();
    }

    let mut out = String::new();
    out.push_str(&PIVOT_COLUMNS.join(","));
    out.push_str("\r\n");

    for row in rows {
        let fields = [
            escape_field(&row.carrier),
            escape_field(&row.location_id),
            escape_field(&row.location_code),
            escape_field(&row.location_name),
            escape_field(&row.procedure),
            escape_field(&row.month),
            number_field(row.metrics.billed),
            number_field(row.metrics.allowed),
            number_field(row.metrics.paid),
            number_field(row.metrics.write_off),
            number_field(row.metrics.write_off_pct),
            optional_number_field(row.metrics.fee_scheduled),
            optional_number_field(row.metrics.schedule_variance),
            row.metrics.claim_count.to_string(),
            bool_field(row.has_issues).to_string(),
        ];
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }

    out
}

pub fn credentialing_to_csv(rows: &[CredentialingRow]) -> String {
    if rows.is_empty() {
        return NO_DATA_BODY.to_string();
    }

    let mut out = String::new();
    out.push_str(&CREDENTIALING_COLUMNS.join(","));
    out.push_str("\r\n");

    for row in rows {
        let alerts_joined = row
            .alerts
            .iter()
            .map(|alert| alert.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let fields = [
            escape_field(&row.provider_npi),
            escape_field(&row.provider_name),
            escape_field(row.tin.as_deref().unwrap_or("")),
            escape_field(&row.location_id),
            escape_field(&row.carrier),
            escape_field(row.plan.as_deref().unwrap_or("")),
            escape_field(&row.status),
            escape_field(row.effective_date.as_deref().unwrap_or("")),
            escape_field(row.term_date.as_deref().unwrap_or("")),
            escape_field(row.last_verified_at.as_deref().unwrap_or("")),
            escape_field(row.verification_source.as_deref().unwrap_or("")),
            escape_field(row.source_url.as_deref().unwrap_or("")),
            escape_field(row.notes.as_deref().unwrap_or("")),
            bool_field(row.is_manual_override).to_string(),
            escape_field(row.override_by.as_deref().unwrap_or("")),
            escape_field(row.override_at.as_deref().unwrap_or("")),
            escape_field(&alerts_joined),
        ];
        out.push_str(&fields.join(","));
        out.push_str("\r\n");
    }

    out
}
