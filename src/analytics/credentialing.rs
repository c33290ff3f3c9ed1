//! Credentialing Engine (C6): enriches each provider-status record with its
//! location name and computes the four alert flags.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};

use super::errors::EngineError;
use super::models::{CredentialingAlert, CredentialingFilter, CredentialingRow, ProviderStatusKind};
use super::store::{ProviderStatusDoc, StoreAdapter};

pub async fn run_credentialing(
    store: &dyn StoreAdapter,
    filter: &CredentialingFilter,
) -> Result<Vec<CredentialingRow>, EngineError> {
    let statuses = store
        .provider_statuses()
        .await
        .map_err(|err| EngineError::StoreUnavailable(err.to_string()))?;

    let locations = store
        .locations()
        .await
        .map_err(|err| EngineError::StoreUnavailable(err.to_string()))?;
    // `PDC_provider_status.location_id` holds the registry's stable `code`,
    // not the location document's own `id`, per `SPEC_FULL.md` §4.6.
    let location_name_by_code: HashMap<String, String> = locations
        .iter()
        .map(|loc| (loc.code.clone(), loc.name.clone()))
        .collect();

    let pre_filtered: Vec<&ProviderStatusDoc> = statuses
        .iter()
        .filter(|status| matches_pre_lookup_filters(status, filter))
        .collect();

    let oon_npis: HashSet<String> = pre_filtered
        .iter()
        .filter(|status| ProviderStatusKind::parse(&status.status) == ProviderStatusKind::Oon)
        .map(|status| status.provider_npi.clone())
        .collect();

    let since = Utc::now() - Duration::days(90);
    let recent_paid = store
        .recent_paid_claims_for_npis(&oon_npis, since)
        .await
        .map_err(|err| EngineError::StoreUnavailable(err.to_string()))?;
    let npis_with_recent_paid_claims: HashSet<String> = recent_paid
        .into_iter()
        .map(|claim| claim.provider_npi)
        .collect();

    let now = Utc::now();
    let mut rows = Vec::with_capacity(pre_filtered.len());

    for status in pre_filtered {
        let alerts = compute_alerts(status, &npis_with_recent_paid_claims, now);

        if filter.issues_only && alerts.is_empty() {
            continue;
        }

        rows.push(CredentialingRow {
            provider_npi: status.provider_npi.clone(),
            provider_name: status.provider_name.clone(),
            tin: status.tin.clone(),
            location_id: status.location_id.clone(),
            location_name: location_name_by_code.get(&status.location_id).cloned(),
            carrier: status.carrier.clone(),
            plan: status.plan.clone(),
            status: status.status.clone(),
            effective_date: status.effective_date.map(|d| d.to_rfc3339()),
            term_date: status.term_date.map(|d| d.to_rfc3339()),
            last_verified_at: status.last_verified_at.map(|d| d.to_rfc3339()),
            verification_source: status.verification_source.clone(),
            source_url: status.source_url.clone(),
            notes: status.notes.clone(),
            is_manual_override: status.is_manual_override,
            override_by: status.override_by.clone(),
            override_at: status.override_at.map(|d| d.to_rfc3339()),
            alerts,
        });
    }

    sort_rows(&mut rows);
    Ok(rows)
}

fn matches_pre_lookup_filters(status: &ProviderStatusDoc, filter: &CredentialingFilter) -> bool {
    if let Some(locations) = &filter.locations {
        if !locations.iter().any(|l| *l == status.location_id) {
            return false;
        }
    }
    if let Some(carriers) = &filter.carriers {
        if !carriers.iter().any(|c| c.eq_ignore_ascii_case(&status.carrier)) {
            return false;
        }
    }
    if let Some(wanted_status) = &filter.status {
        if ProviderStatusKind::parse(&status.status) != *wanted_status {
            return false;
        }
    }
    // `start`/`end` scope `last_verified_at`, not `effective_date`, per
    // `SPEC_FULL.md` §4.6.
    if let (Some(start), Some(last_verified_at)) = (filter.start, status.last_verified_at) {
        if last_verified_at.date_naive() < start {
            return false;
        }
    }
    if let (Some(end), Some(last_verified_at)) = (filter.end, status.last_verified_at) {
        if last_verified_at.date_naive() > end {
            return false;
        }
    }
    true
}

fn compute_alerts(
    status: &ProviderStatusDoc,
    npis_with_recent_paid_claims: &HashSet<String>,
    now: chrono::DateTime<Utc>,
) -> Vec<CredentialingAlert> {
    let mut alerts = Vec::new();

    let is_oon = ProviderStatusKind::parse(&status.status) == ProviderStatusKind::Oon;
    if is_oon && npis_with_recent_paid_claims.contains(&status.provider_npi) {
        alerts.push(CredentialingAlert::NetworkMismatch);
    }

    if let Some(term_date) = status.term_date {
        if term_date >= now && term_date <= now + Duration::days(30) {
            alerts.push(CredentialingAlert::ExpiringSoon);
        }
    }

    if let Some(last_verified_at) = status.last_verified_at {
        if last_verified_at < now - Duration::days(30) {
            alerts.push(CredentialingAlert::StaleData);
        }
    }

    let is_pending = ProviderStatusKind::parse(&status.status) == ProviderStatusKind::Pending;
    if is_pending {
        if let Some(effective_date) = status.effective_date {
            if effective_date > now {
                alerts.push(CredentialingAlert::PendingEffective);
            }
        }
    }

    alerts
}

fn sort_rows(rows: &mut [CredentialingRow]) {
    rows.sort_by(|a, b| {
        a.provider_name
            .cmp(&b.provider_name)
            .then_with(|| a.location_id.cmp(&b.location_id))
            .then_with(|| a.carrier.cmp(&b.carrier))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::store::fake::FakeStoreAdapter;
    use crate::analytics::store::{ClaimDoc, LocationDoc, PatientDoc, ProcedureDoc, ProcessedClaimDoc};

    fn base_status(npi: &str, status: &str) -> ProviderStatusDoc {
        ProviderStatusDoc {
            provider_npi: npi.to_string(),
            provider_name: "Dr. Example".to_string(),
            tin: None,
            location_id: "loc-1".to_string(),
            carrier: "AETNA".to_string(),
            plan: None,
            status: status.to_string(),
            effective_date: None,
            term_date: None,
            last_verified_at: None,
            verification_source: None,
            source_url: None,
            notes: None,
            is_manual_override: false,
            override_by: None,
            override_at: None,
        }
    }

    #[tokio::test]
    async fn network_mismatch_set_when_oon_and_recent_paid_claim_exists() {
        let mut status = base_status("2222222222", "OON");
        status.location_id = "VEGAS".to_string();

        let claim = ProcessedClaimDoc {
            id: "claim-1".to_string(),
            job_id: "job-1".to_string(),
            location_id: "VEGAS".to_string(),
            patients: vec![PatientDoc {
                claims: vec![ClaimDoc {
                    date_received: Some(Utc::now() - Duration::days(15)),
                    provider_npi: Some("2222222222".to_string()),
                    procedures: vec![ProcedureDoc {
                        proc_code: Some("D0120".to_string()),
                        fee_billed: 100.0,
                        allowed_amount: 80.0,
                        ins_amount_paid: 60.0,
                        write_off: 20.0,
                    }],
                }],
            }],
        };

        let store = FakeStoreAdapter::new()
            .with_provider_statuses(vec![status])
            .with_claims(vec![claim])
            .with_locations(vec![LocationDoc {
                id: "VEGAS".to_string(),
                code: "VEGAS".to_string(),
                name: "Vegas Clinic".to_string(),
                active: true,
            }]);

        let rows = run_credentialing(&store, &CredentialingFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].alerts.contains(&CredentialingAlert::NetworkMismatch));
    }

    #[tokio::test]
    async fn composite_alerts_and_issues_only_filter() {
        let now = Utc::now();

        let mut expiring = base_status("1111111111", "ACTIVE");
        expiring.term_date = Some(now + Duration::days(20));

        let mut stale = base_status("3333333333", "ACTIVE");
        stale.last_verified_at = Some(now - Duration::days(45));

        let mut pending = base_status("4444444444", "PENDING");
        pending.effective_date = Some(now + Duration::days(10));

        let clean = base_status("5555555555", "ACTIVE");

        let store = FakeStoreAdapter::new().with_provider_statuses(vec![
            expiring, stale, pending, clean,
        ]);

        let all_rows = run_credentialing(&store, &CredentialingFilter::default())
            .await
            .unwrap();
        assert_eq!(all_rows.len(), 4);

        let filter = CredentialingFilter {
            issues_only: true,
            ..Default::default()
        };
        let issue_rows = run_credentialing(&store, &filter).await.unwrap();
        assert_eq!(issue_rows.len(), 3);
    }

    #[tokio::test]
    async fn clean_active_record_has_empty_alerts() {
        let mut status = base_status("6666666666", "ACTIVE");
        status.last_verified_at = Some(Utc::now());
        let store = FakeStoreAdapter::new().with_provider_statuses(vec![status]);

        let rows = run_credentialing(&store, &CredentialingFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].alerts.is_empty());
    }

    #[tokio::test]
    async fn location_name_joins_on_registry_code_not_document_id() {
        let mut status = base_status("7777777777", "ACTIVE");
        status.location_id = "VEGAS".to_string();

        let store = FakeStoreAdapter::new()
            .with_provider_statuses(vec![status])
            .with_locations(vec![LocationDoc {
                id: "64f0aaaa0000000000000001".to_string(),
                code: "VEGAS".to_string(),
                name: "Vegas Clinic".to_string(),
                active: true,
            }]);

        let rows = run_credentialing(&store, &CredentialingFilter::default())
            .await
            .unwrap();
        assert_eq!(rows[0].location_name.as_deref(), Some("Vegas Clinic"));
    }

    #[tokio::test]
    async fn start_end_filter_scopes_last_verified_at_not_effective_date() {
        let now = Utc::now();
        let mut in_range = base_status("8888888888", "ACTIVE");
        in_range.last_verified_at = Some(now);
        in_range.effective_date = Some(now - Duration::days(400));

        let mut out_of_range = base_status("9999999999", "ACTIVE");
        out_of_range.last_verified_at = Some(now - Duration::days(400));
        out_of_range.effective_date = Some(now);

        let store = FakeStoreAdapter::new()
            .with_provider_statuses(vec![in_range, out_of_range]);

        let filter = CredentialingFilter {
            start: Some((now - Duration::days(1)).date_naive()),
            end: Some((now + Duration::days(1)).date_naive()),
            ..Default::default()
        };
        let rows = run_credentialing(&store, &filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].provider_npi, "8888888888");
    }
}
