//! Canonical filter and result shapes shared by the pivot and credentialing
//! engines.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub locations: Option<Vec<String>>,
    pub carriers: Option<Vec<String>>,
    pub procedures: Option<Vec<String>>,
    pub min_count: i64,
    pub page: i64,
    pub limit: i64,
}

impl PivotFilter {
    pub fn defaults() -> Self {
        Self {
            start: None,
            end: None,
            locations: None,
            carriers: None,
            procedures: None,
            min_count: 0,
            page: 1,
            limit: 20_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderStatusKind {
    Active,
    Pending,
    Terminated,
    Oon,
    Unknown,
}

impl ProviderStatusKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "ACTIVE" => ProviderStatusKind::Active,
            "PENDING" => ProviderStatusKind::Pending,
            "TERMINATED" => ProviderStatusKind::Terminated,
            "OON" => ProviderStatusKind::Oon,
            _ => ProviderStatusKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatusKind::Active => "ACTIVE",
            ProviderStatusKind::Pending => "PENDING",
            ProviderStatusKind::Terminated => "TERMINATED",
            ProviderStatusKind::Oon => "OON",
            ProviderStatusKind::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CredentialingFilter {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub locations: Option<Vec<String>>,
    pub carriers: Option<Vec<String>>,
    pub status: Option<ProviderStatusKind>,
    pub issues_only: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PivotMetrics {
    pub billed: f64,
    pub allowed: f64,
    pub paid: f64,
    #[serde(rename = "writeOff")]
    pub write_off: f64,
    #[serde(rename = "writeOffPct")]
    pub write_off_pct: f64,
    #[serde(rename = "feeScheduled")]
    pub fee_scheduled: Option<f64>,
    #[serde(rename = "scheduleVariance")]
    pub schedule_variance: Option<f64>,
    #[serde(rename = "claimCount")]
    pub claim_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PivotRow {
    pub carrier: String,
    #[serde(rename = "locationId")]
    pub location_id: String,
    #[serde(rename = "locationCode")]
    pub location_code: String,
    #[serde(rename = "locationName")]
    pub location_name: String,
    pub procedure: String,
    pub month: String,
    pub metrics: PivotMetrics,
    #[serde(rename = "hasIssues")]
    pub has_issues: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PivotDateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PivotSummary {
    #[serde(rename = "totalRows")]
    pub total_rows: usize,
    #[serde(rename = "dateRange")]
    pub date_range: PivotDateRange,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PivotResult {
    pub rows: Vec<PivotRow>,
    pub summary: PivotSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialingAlert {
    #[serde(rename = "NETWORK_MISMATCH")]
    NetworkMismatch,
    #[serde(rename = "EXPIRING_SOON")]
    ExpiringSoon,
    #[serde(rename = "STALE_DATA")]
    StaleData,
    #[serde(rename = "PENDING_EFFECTIVE")]
    PendingEffective,
}

impl CredentialingAlert {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialingAlert::NetworkMismatch => "NETWORK_MISMATCH",
            CredentialingAlert::ExpiringSoon => "EXPIRING_SOON",
            CredentialingAlert::StaleData => "STALE_DATA",
            CredentialingAlert::PendingEffective => "PENDING_EFFECTIVE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialingRow {
    pub provider_npi: String,
    pub provider_name: String,
    pub tin: Option<String>,
    pub location_id: String,
    pub location_name: Option<String>,
    pub carrier: String,
    pub plan: Option<String>,
    pub status: String,
    pub effective_date: Option<String>,
    pub term_date: Option<String>,
    pub last_verified_at: Option<String>,
    pub verification_source: Option<String>,
    pub source_url: Option<String>,
    pub notes: Option<String>,
    pub is_manual_override: bool,
    pub override_by: Option<String>,
    pub override_at: Option<String>,
    pub alerts: Vec<CredentialingAlert>,
}
