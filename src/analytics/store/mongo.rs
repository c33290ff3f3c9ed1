//! Production `StoreAdapter` backed by a pooled `mongodb::Client`, issuing
//! one logical client against the three databases (`activity`, `registry`,
//! `crucible`) exactly as `SPEC_FULL.md` §3 lays them out.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::options::AggregateOptions;
use mongodb::Client;
use tracing::warn;

use super::bsonutil::{money, opt_bool, opt_datetime, opt_str, req_str};
use super::{
    ClaimDoc, FeeScheduleEntry, HealthReport, JobDoc, LocationDoc, PatientDoc, ProcedureDoc,
    ProcessedClaimDoc, ProviderStatusDoc, RecentPaidClaim, StoreAdapter, StoreError,
};

const ACTIVITY_DB: &str = "activity";
const REGISTRY_DB: &str = "registry";
const CRUCIBLE_DB: &str = "crucible";

pub struct MongoStoreAdapter {
    client: Client,
}

impl MongoStoreAdapter {
    pub async fn connect(uri: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self { client })
    }

    fn map_err(err: mongodb::error::Error) -> StoreError {
        StoreError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl StoreAdapter for MongoStoreAdapter {
    async fn processed_claims(&self) -> Result<Vec<ProcessedClaimDoc>, StoreError> {
        let collection = self
            .client
            .database(ACTIVITY_DB)
            .collection::<Document>("processedclaims");

        // An empty-match aggregation with `allow_disk_use` stands in for the
        // driving fetch so large intermediate states can spill to disk,
        // matching the store-adapter contract in `SPEC_FULL.md` §4.4.
        let options = AggregateOptions::builder().allow_disk_use(true).build();
        let pipeline = vec![doc! { "$match": {} }];
        let mut cursor = collection
            .aggregate(pipeline, options)
            .await
            .map_err(Self::map_err)?;

        let mut out = Vec::new();
        while let Some(raw) = cursor.try_next().await.map_err(Self::map_err)? {
            out.push(parse_processed_claim(&raw));
        }
        Ok(out)
    }

    async fn jobs_by_ids(
        &self,
        ids: &HashSet<String>,
    ) -> Result<HashMap<String, JobDoc>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let collection = self
            .client
            .database(ACTIVITY_DB)
            .collection::<Document>("jobs");

        let id_values: Vec<Bson> = ids.iter().map(|id| Bson::String(id.clone())).collect();
        let mut cursor = collection
            .find(doc! { "id": { "$in": id_values } }, None)
            .await
            .map_err(Self::map_err)?;

        let mut out = HashMap::new();
        while let Some(raw) = cursor.try_next().await.map_err(Self::map_err)? {
            let job = parse_job(&raw);
            out.insert(job.id.clone(), job);
        }
        Ok(out)
    }

    async fn locations(&self) -> Result<Vec<LocationDoc>, StoreError> {
        let collection = self
            .client
            .database(REGISTRY_DB)
            .collection::<Document>("locations");
        let mut cursor = collection.find(None, None).await.map_err(Self::map_err)?;

        let mut out = Vec::new();
        while let Some(raw) = cursor.try_next().await.map_err(Self::map_err)? {
            out.push(parse_location(&raw));
        }
        Ok(out)
    }

    async fn fee_schedules_for_locations(
        &self,
        location_codes: &HashSet<String>,
    ) -> Result<Vec<FeeScheduleEntry>, StoreError> {
        if location_codes.is_empty() {
            return Ok(Vec::new());
        }
        let collection = self
            .client
            .database(CRUCIBLE_DB)
            .collection::<Document>("PDC_fee_schedules");

        let code_values: Vec<Bson> = location_codes
            .iter()
            .map(|code| Bson::String(code.clone()))
            .collect();
        let mut cursor = collection
            .find(doc! { "location_id": { "$in": code_values } }, None)
            .await
            .map_err(Self::map_err)?;

        let mut out = Vec::new();
        while let Some(raw) = cursor.try_next().await.map_err(Self::map_err)? {
            out.extend(parse_fee_schedule_entries(&raw));
        }
        Ok(out)
    }

    async fn provider_statuses(&self) -> Result<Vec<ProviderStatusDoc>, StoreError> {
        let collection = self
            .client
            .database(CRUCIBLE_DB)
            .collection::<Document>("PDC_provider_status");
        let mut cursor = collection.find(None, None).await.map_err(Self::map_err)?;

        let mut out = Vec::new();
        while let Some(raw) = cursor.try_next().await.map_err(Self::map_err)? {
            out.push(parse_provider_status(&raw));
        }
        Ok(out)
    }

    async fn recent_paid_claims_for_npis(
        &self,
        npis: &HashSet<String>,
        since: DateTime<Utc>,
    ) -> Result<Vec<RecentPaidClaim>, StoreError> {
        if npis.is_empty() {
            return Ok(Vec::new());
        }
        // The source's own NETWORK_MISMATCH lookup only filters on
        // `provider_npi`; date/paid-amount predicates are applied after
        // flattening here rather than pushed into a `$match`, mirroring the
        // documented (and intentionally not "fixed") ambiguity in
        // `SPEC_FULL.md` §9.
        let all_claims = self.processed_claims().await?;
        let mut out = Vec::new();
        for claim in &all_claims {
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
        let mut violations = Vec::new();

        for db_name in [ACTIVITY_DB, REGISTRY_DB, CRUCIBLE_DB] {
            let names = match self.client.database(db_name).list_collection_names(None).await {
                Ok(names) => names,
                Err(err) => {
                    warn!(database = db_name, error = ?err, "health probe failed to list collections");
                    continue;
                }
            };

            for name in names {
                let is_pdc = name.starts_with("PDC_");
                let is_registry_only = name == "locations";
                let is_activity_only = name == "processedclaims" || name == "jobs";

                if is_pdc && db_name != CRUCIBLE_DB {
                    violations.push(format!("{name} found outside crucible (in {db_name})"));
                }
                if is_registry_only && db_name != REGISTRY_DB {
                    violations.push(format!("{name} found outside registry (in {db_name})"));
                }
                if is_activity_only && db_name != ACTIVITY_DB {
                    violations.push(format!("{name} found outside activity (in {db_name})"));
                }
            }
        }

        Ok(HealthReport {
            ok: violations.is_empty(),
            violations,
        })
    }
}

fn parse_processed_claim(raw: &Document) -> ProcessedClaimDoc {
    let mut patients = Vec::new();
    if let Ok(patients_raw) = raw.get_array("patients").or_else(|_| {
        raw.get_document("data")
            .and_then(|data| data.get_array("patients"))
    }) {
        for patient_bson in patients_raw {
            if let Bson::Document(patient_doc) = patient_bson {
                patients.push(parse_patient(patient_doc));
            }
        }
    }

    ProcessedClaimDoc {
        id: req_str(raw, "id"),
        job_id: req_str(raw, "job_id"),
        location_id: req_str(raw, "locationId"),
        patients,
    }
}

fn parse_patient(raw: &Document) -> PatientDoc {
    let mut claims = Vec::new();
    if let Ok(claims_raw) = raw.get_array("claims") {
        for claim_bson in claims_raw {
            if let Bson::Document(claim_doc) = claim_bson {
                claims.push(parse_claim(claim_doc));
            }
        }
    }
    PatientDoc { claims }
}

fn parse_claim(raw: &Document) -> ClaimDoc {
    let mut procedures = Vec::new();
    if let Ok(procedures_raw) = raw.get_array("procedures") {
        for procedure_bson in procedures_raw {
            if let Bson::Document(procedure_doc) = procedure_bson {
                procedures.push(parse_procedure(procedure_doc));
            }
        }
    }

    ClaimDoc {
        date_received: opt_datetime(raw, "date_received"),
        provider_npi: opt_str(raw, "provider_npi"),
        procedures,
    }
}

fn parse_procedure(raw: &Document) -> ProcedureDoc {
    ProcedureDoc {
        proc_code: opt_str(raw, "procCode"),
        fee_billed: money(raw, "feeBilled"),
        allowed_amount: money(raw, "allowedAmount"),
        ins_amount_paid: money(raw, "insAmountPaid"),
        write_off: money(raw, "writeOff"),
    }
}

fn parse_job(raw: &Document) -> JobDoc {
    let payment = raw.get_document("payment").ok();
    JobDoc {
        id: req_str(raw, "id"),
        location_id: req_str(raw, "locationId"),
        carrier_name: payment.and_then(|p| opt_str(p, "carrierName")),
        date_issued: payment.and_then(|p| opt_datetime(p, "dateIssued")),
    }
}

fn parse_location(raw: &Document) -> LocationDoc {
    LocationDoc {
        id: req_str(raw, "id"),
        code: req_str(raw, "code"),
        name: req_str(raw, "name"),
        active: opt_bool(raw, "active", true),
    }
}

fn parse_fee_schedule_entries(raw: &Document) -> Vec<FeeScheduleEntry> {
    let location_code = req_str(raw, "location_id");
    let collected_at = opt_datetime(raw, "collected_at").unwrap_or_else(|| DateTime::<Utc>::MIN_UTC);

    let mut out = Vec::new();
    if let Ok(schedules) = raw.get_array("fee_schedules") {
        for schedule_bson in schedules {
            let Bson::Document(schedule_doc) = schedule_bson else {
                continue;
            };
            let description = req_str(schedule_doc, "Description");
            if let Ok(fees) = schedule_doc.get_array("fees") {
                for fee_bson in fees {
                    let Bson::Document(fee_doc) = fee_bson else {
                        continue;
                    };
                    out.push(FeeScheduleEntry {
                        location_code: location_code.clone(),
                        description: description.clone(),
                        procedure_code: req_str(fee_doc, "ProcedureCode"),
                        amount: money(fee_doc, "Amount"),
                        collected_at,
                    });
                }
            }
        }
    }
    out
}

fn parse_provider_status(raw: &Document) -> ProviderStatusDoc {
    ProviderStatusDoc {
        provider_npi: req_str(raw, "provider_npi"),
        provider_name: req_str(raw, "provider_name"),
        tin: opt_str(raw, "tin"),
        location_id: req_str(raw, "location_id"),
        carrier: req_str(raw, "carrier"),
        plan: opt_str(raw, "plan"),
        status: req_str(raw, "status"),
        effective_date: opt_datetime(raw, "effective_date"),
        term_date: opt_datetime(raw, "term_date"),
        last_verified_at: opt_datetime(raw, "last_verified_at"),
        verification_source: opt_str(raw, "verification_source"),
        source_url: opt_str(raw, "source_url"),
        notes: opt_str(raw, "notes"),
        is_manual_override: opt_bool(raw, "is_manual_override", false),
        override_by: opt_str(raw, "override_by"),
        override_at: opt_datetime(raw, "override_at"),
    }
}
