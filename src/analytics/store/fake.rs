//! In-memory `StoreAdapter` for deterministic tests. Gated behind the
//! `test-utils` feature so production builds never link fixture plumbing.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    FeeScheduleEntry, HealthReport, JobDoc, LocationDoc, ProcessedClaimDoc, ProviderStatusDoc,
    RecentPaidClaim, StoreAdapter, StoreError,
};

#[derive(Debug, Clone, Default)]
pub struct FakeStoreAdapter {
    pub claims: Vec<ProcessedClaimDoc>,
    pub jobs: Vec<JobDoc>,
    pub locations: Vec<LocationDoc>,
    pub fee_schedules: Vec<FeeScheduleEntry>,
    pub provider_statuses: Vec<ProviderStatusDoc>,
    pub health: HealthReport,
}

impl FakeStoreAdapter {
    pub fn new() -> Self {
        Self {
            health: HealthReport {
                ok: true,
                violations: Vec::new(),
            },
            ..Default::default()
        }
    }

    pub fn with_claims(mut self, claims: Vec<ProcessedClaimDoc>) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<JobDoc>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_locations(mut self, locations: Vec<LocationDoc>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_fee_schedules(mut self, fee_schedules: Vec<FeeScheduleEntry>) -> Self {
        self.fee_schedules = fee_schedules;
        self
    }

    pub fn with_provider_statuses(mut self, provider_statuses: Vec<ProviderStatusDoc>) -> Self {
        self.provider_statuses = provider_statuses;
        self
    }
}

#[async_trait]
impl StoreAdapter for FakeStoreAdapter {
    async fn processed_claims(&self) -> Result<Vec<ProcessedClaimDoc>, StoreError> {
        Ok(self.claims.clone())
    }

    async fn jobs_by_ids(
        &self,
        ids: &HashSet<String>,
    ) -> Result<HashMap<String, JobDoc>, StoreError> {
        Ok(self
            .jobs
            .iter()
            .filter(|job| ids.contains(&job.id))
            .map(|job| (job.id.clone(), job.clone()))
            .collect())
    }

    async fn locations(&self) -> Result<Vec<LocationDoc>, StoreError> {
        Ok(self.locations.clone())
    }

    async fn fee_schedules_for_locations(
        &self,
        location_codes: &HashSet<String>,
    ) -> Result<Vec<FeeScheduleEntry>, StoreError> {
        Ok(self
            .fee_schedules
            .iter()
            .filter(|entry| location_codes.contains(&entry.location_code))
            .cloned()
            .collect())
    }

    async fn provider_statuses(&self) -> Result<Vec<ProviderStatusDoc>, StoreError> {
        Ok(self.provider_statuses.clone())
    }

    async fn recent_paid_claims_for_npis(
        &self,
        npis: &HashSet<String>,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecentPaidClaim>, StoreError> {
        let mut out = Vec::new();
        for claim in &self.claims {
            for patient in &claim.patients {
                for line in &patient.claims {
                    let Some(npi) = &line.provider_npi else {
                        continue;
                    };
                    if !npis.contains(npi) {
                        continue;
                    }
                    let Some(date_received) = line.date_received else {
                        continue;
                    };
                    if date_received < since {
                        continue;
                    }
                    for procedure in &line.procedures {
                        if procedure.ins_amount_paid > 0.0 {
                            out.push(RecentPaidClaim {
                                provider_npi: npi.clone(),
                                date_received,
                                ins_amount_paid: procedure.ins_amount_paid,
                            });
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    async fn health_probe(&self) -> Result<HealthReport, StoreError> {
        Ok(self.health.clone())
    }
}
