//! Store Adapter (C4).
//!
//! Exposes the document shapes the engines need and a single capability per
//! collection: fetch the driving row set, or batch-lookup a joined
//! collection by key. A `mongodb` client cannot aggregate across databases,
//! so cross-database joins (job → location → fee schedule, provider status →
//! recent paid claims) are always performed client-side by the engines
//! against the batch lookups this trait exposes, per `SPEC_FULL.md` §9.

pub mod bsonutil;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod mongo;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation timed out")]
    Timeout,
}

#[derive(Debug, Clone, Default)]
pub struct ProcedureDoc {
    pub proc_code: Option<String>,
    pub fee_billed: f64,
    pub allowed_amount: f64,
    pub ins_amount_paid: f64,
    pub write_off: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ClaimDoc {
    pub date_received: Option<DateTime<Utc>>,
    pub provider_npi: Option<String>,
    pub procedures: Vec<ProcedureDoc>,
}

#[derive(Debug, Clone, Default)]
pub struct PatientDoc {
    pub claims: Vec<ClaimDoc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessedClaimDoc {
    pub id: String,
    pub job_id: String,
    pub location_id: String,
    pub patients: Vec<PatientDoc>,
}

#[derive(Debug, Clone, Default)]
pub struct JobDoc {
    pub id: String,
    pub location_id: String,
    pub carrier_name: Option<String>,
    pub date_issued: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct LocationDoc {
    pub id: String,
    pub code: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FeeScheduleEntry {
    pub location_code: String,
    pub description: String,
    pub procedure_code: String,
    pub amount: f64,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProviderStatusDoc {
    pub provider_npi: String,
    pub provider_name: String,
    pub tin: Option<String>,
    pub location_id: String,
    pub carrier: String,
    pub plan: Option<String>,
    pub status: String,
    pub effective_date: Option<DateTime<Utc>>,
    pub term_date: Option<DateTime<Utc>>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub verification_source: Option<String>,
    pub source_url: Option<String>,
    pub notes: Option<String>,
    pub is_manual_override: bool,
    pub override_by: Option<String>,
    pub override_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct RecentPaidClaim {
    pub provider_npi: String,
    pub date_received: DateTime<Utc>,
    pub ins_amount_paid: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub ok: bool,
    pub violations: Vec<String>,
}

#[async_trait]
pub trait StoreAdapter: Send + Sync {
    async fn processed_claims(&self) -> Result<Vec<ProcessedClaimDoc>, StoreError>;

    async fn jobs_by_ids(
        &self,
        ids: &HashSet<String>,
    ) -> Result<HashMap<String, JobDoc>, StoreError>;

    async fn locations(&self) -> Result<Vec<LocationDoc>, StoreError>;

    async fn fee_schedules_for_locations(
        &self,
        location_codes: &HashSet<String>,
    ) -> Result<Vec<FeeScheduleEntry>, StoreError>;

    async fn provider_statuses(&self) -> Result<Vec<ProviderStatusDoc>, StoreError>;

    async fn recent_paid_claims_for_npis(
        &self,
        npis: &HashSet<String>,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecentPaidClaim>, StoreError>;

    async fn health_probe(&self) -> Result<HealthReport, StoreError>;
}
