//! Pivot Engine (C5): flattens nested claim documents into per-(carrier,
//! location, procedure, month) rows, joins fee schedules under carrier
//! precedence, and derives the write-off and schedule-variance metrics.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::America::Denver;
use tracing::debug;

use super::errors::EngineError;
use super::models::{PivotDateRange, PivotFilter, PivotMetrics, PivotResult, PivotRow, PivotSummary};
use super::store::{
    FeeScheduleEntry, JobDoc, LocationDoc, ProcessedClaimDoc, StoreAdapter,
};

/// Approximate 1-in-100 sampling rate for the data-quality side channel;
/// `DEBUG_PIVOT` forces every call regardless of this counter.
static DATA_QUALITY_SAMPLE_COUNTER: std::sync::atomic::AtomicU64 =
    std::sync::atomic::AtomicU64::new(0);

/// One flattened line item before grouping: a single procedure within a
/// single claim, already joined against its job and location.
struct FlatLine {
    carrier: String,
    location_id: String,
    procedure: String,
    month: String,
    billed: f64,
    allowed: f64,
    paid: f64,
    write_off: f64,
    date_received: DateTime<Utc>,
}

struct GroupKey {
    carrier: String,
    location_id: String,
    procedure: String,
    month: String,
}

pub async fn run_pivot(
    store: &dyn StoreAdapter,
    filter: &PivotFilter,
) -> Result<PivotResult, EngineError> {
    run_pivot_with_sampling(store, filter, false).await
}

/// Same as [`run_pivot`] but lets the caller force the data-quality sampling
/// log regardless of the sampling counter, per `DEBUG_PIVOT`.
pub async fn run_pivot_with_sampling(
    store: &dyn StoreAdapter,
    filter: &PivotFilter,
    force_data_quality_log: bool,
) -> Result<PivotResult, EngineError> {
    let claims = store
        .processed_claims()
        .await
        .map_err(|err| EngineError::StoreUnavailable(err.to_string()))?;

    let job_ids: HashSet<String> = claims.iter().map(|c| c.job_id.clone()).collect();
    let jobs = store
        .jobs_by_ids(&job_ids)
        .await
        .map_err(|err| EngineError::StoreUnavailable(err.to_string()))?;

    let locations = store
        .locations()
        .await
        .map_err(|err| EngineError::StoreUnavailable(err.to_string()))?;
    let location_by_id: HashMap<String, &LocationDoc> =
        locations.iter().map(|loc| (loc.id.clone(), loc)).collect();

    let location_codes: HashSet<String> = locations.iter().map(|loc| loc.code.clone()).collect();
    let fee_schedules = store
        .fee_schedules_for_locations(&location_codes)
        .await
        .map_err(|err| EngineError::StoreUnavailable(err.to_string()))?;

    let flatten_outcome = flatten_claims(&claims, &jobs, &location_by_id, filter);
    debug!(
        lines = flatten_outcome.lines.len(),
        dropped = flatten_outcome.dropped,
        "pivot: flattened claim lines"
    );

    if force_data_quality_log || sampled_for_data_quality_log() {
        log_data_quality_sample(&flatten_outcome);
    }

    let grouped = group_lines(flatten_outcome.lines);

    let mut rows = Vec::with_capacity(grouped.len());
    let mut earliest: Option<DateTime<Utc>> = None;
    let mut latest: Option<DateTime<Utc>> = None;

    for (key, lines) in grouped {
        let location = location_by_id.get(&key.location_id);
        let location_code = location.map(|l| l.code.clone()).unwrap_or_default();
        let location_name = location.map(|l| l.name.clone()).unwrap_or_default();

        let billed: f64 = lines.iter().map(|l| l.billed).sum();
        let allowed: f64 = lines.iter().map(|l| l.allowed).sum();
        let paid: f64 = lines.iter().map(|l| l.paid).sum();
        let write_off: f64 = lines.iter().map(|l| l.write_off).sum();
        let claim_count = lines.len() as i64;

        for line in &lines {
            earliest = Some(earliest.map_or(line.date_received, |e| e.min(line.date_received)));
            latest = Some(latest.map_or(line.date_received, |l| l.max(line.date_received)));
        }

        let write_off_pct = if billed > 0.0 {
            (write_off / billed) * 100.0
        } else {
            0.0
        };

        let fee_scheduled = best_fee_schedule_amount(
            &fee_schedules,
            &key.carrier,
            &location_code,
            &key.procedure,
        );
        // `feeScheduled` coalesces to 0 in the pseudo-formula, but the
        // concrete no-schedule scenario expects `scheduleVariance: null`
        // rather than a 100% variance, so an absent schedule short-circuits
        // to null here too.
        let schedule_variance = match fee_scheduled {
            Some(scheduled) if billed > 0.0 => Some(((billed - scheduled) / billed) * 100.0),
            _ => None,
        };

        let has_issues = (billed - (allowed + paid + write_off)).abs() > 1.0;

        rows.push(PivotRow {
            carrier: key.carrier,
            location_id: key.location_id,
            location_code,
            location_name,
            procedure: key.procedure,
            month: key.month,
            metrics: PivotMetrics {
                billed,
                allowed,
                paid,
                write_off,
                write_off_pct,
                fee_scheduled,
                schedule_variance,
                claim_count,
            },
            has_issues,
        });
    }

    rows.retain(|row| row.metrics.claim_count >= filter.min_count);

    sort_rows(&mut rows);
    let total_rows = rows.len();
    let paginated = paginate(rows, filter.page, filter.limit);

    Ok(PivotResult {
        rows: paginated,
        summary: PivotSummary {
            total_rows,
            date_range: PivotDateRange {
                start: earliest.map(|d| d.format("%Y-%m-%d").to_string()),
                end: latest.map(|d| d.format("%Y-%m-%d").to_string()),
            },
            last_updated: Utc::now().to_rfc3339(),
        },
    })
}

/// Result of the flatten stage, carrying the retention counters the
/// data-quality side channel reports (total line items considered vs. those
/// that survived the malformed/empty-row drops).
struct FlattenOutcome {
    lines: Vec<FlatLine>,
    total_line_items: u64,
    dropped: u64,
}

fn flatten_claims(
    claims: &[ProcessedClaimDoc],
    jobs: &HashMap<String, JobDoc>,
    location_by_id: &HashMap<String, &LocationDoc>,
    filter: &PivotFilter,
) -> FlattenOutcome {
    let mut out = Vec::new();
    let mut total_line_items: u64 = 0;
    let mut dropped: u64 = 0;

    for claim in claims {
        let job = jobs.get(&claim.job_id);
        let carrier = job
            .and_then(|j| j.carrier_name.clone())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_default();

        if let Some(wanted) = &filter.carriers {
            if !wanted.iter().any(|c| c.eq_ignore_ascii_case(&carrier)) {
                continue;
            }
        }
        if let Some(wanted) = &filter.locations {
            let matches_code = location_by_id
                .get(&claim.location_id)
                .map(|loc| wanted.iter().any(|l| *l == loc.code))
                .unwrap_or(false);
            if !matches_code {
                continue;
            }
        }

        for patient in &claim.patients {
            for line in &patient.claims {
                // dosRecv falls back to the job's payment date when the
                // claim line carries none of its own.
                let Some(date_received) = line.date_received.or(job.and_then(|j| j.date_issued))
                else {
                    total_line_items += line.procedures.len() as u64;
                    dropped += line.procedures.len() as u64;
                    continue;
                };

                if let Some(start) = filter.start {
                    if date_received.date_naive() < start {
                        continue;
                    }
                }
                if let Some(end) = filter.end {
                    if date_received.date_naive() > end {
                        continue;
                    }
                }

                let month = month_bucket(date_received);

                for procedure in &line.procedures {
                    total_line_items += 1;

                    // Malformed: no procedure code (or a blank one) to
                    // group by. Checked here rather than relied on from the
                    // store parser, since the engine owns this invariant.
                    let Some(proc_code) = procedure
                        .proc_code
                        .as_ref()
                        .filter(|code| !code.trim().is_empty())
                    else {
                        dropped += 1;
                        continue;
                    };

                    // Fully empty: neither a carrier nor any positive
                    // monetary field, so there is nothing to report.
                    let has_positive_money = procedure.fee_billed > 0.0
                        || procedure.allowed_amount > 0.0
                        || procedure.ins_amount_paid > 0.0
                        || procedure.write_off > 0.0;
                    if carrier.is_empty() && !has_positive_money {
                        dropped += 1;
                        continue;
                    }

                    if let Some(wanted) = &filter.procedures {
                        if !wanted.iter().any(|p| p.eq_ignore_ascii_case(proc_code)) {
                            continue;
                        }
                    }

                    out.push(FlatLine {
                        carrier: carrier.clone(),
                        location_id: claim.location_id.clone(),
                        procedure: proc_code.clone(),
                        month: month.clone(),
                        billed: procedure.fee_billed,
                        allowed: procedure.allowed_amount,
                        paid: procedure.ins_amount_paid,
                        write_off: procedure.write_off,
                        date_received,
                    });
                }
            }
        }
    }

    FlattenOutcome {
        lines: out,
        total_line_items,
        dropped,
    }
}

/// Buckets a UTC instant into its calendar month in America/Denver, since the
/// dashboards report in the practice's local time rather than UTC.
fn month_bucket(instant: DateTime<Utc>) -> String {
    let local = instant.with_timezone(&Denver);
    format!("{:04}-{:02}", local.year(), local.month())
}

fn group_lines(lines: Vec<FlatLine>) -> Vec<(GroupKey, Vec<FlatLine>)> {
    let mut groups: Vec<(GroupKey, Vec<FlatLine>)> = Vec::new();
    let mut index: HashMap<(String, String, String, String), usize> = HashMap::new();

    for line in lines {
        let key_tuple = (
            line.carrier.clone(),
            line.location_id.clone(),
            line.procedure.clone(),
            line.month.clone(),
        );
        if let Some(&idx) = index.get(&key_tuple) {
            groups[idx].1.push(line);
        } else {
            let idx = groups.len();
            index.insert(key_tuple, idx);
            groups.push((
                GroupKey {
                    carrier: line.carrier.clone(),
                    location_id: line.location_id.clone(),
                    procedure: line.procedure.clone(),
                    month: line.month.clone(),
                },
                vec![line],
            ));
        }
    }

    groups
}

/// Selects the fee schedule entry to compare against under carrier
/// precedence: an exact carrier-named schedule beats a location default,
/// which beats the `UCR|DEFAULT` catch-all; ties broken by most recently
/// collected.
fn best_fee_schedule_amount(
    entries: &[FeeScheduleEntry],
    carrier: &str,
    location_code: &str,
    procedure: &str,
) -> Option<f64> {
    let mut candidates: Vec<(&FeeScheduleEntry, u8)> = Vec::new();

    for entry in entries {
        if entry.location_code != location_code || entry.procedure_code != procedure {
            continue;
        }
        candidates.push((entry, fee_schedule_precedence(&entry.description, carrier)));
    }

    candidates.sort_by(|a, b| {
        a.1.cmp(&b.1)
            .then_with(|| b.0.collected_at.cmp(&a.0.collected_at))
    });

    candidates.first().map(|(entry, _)| entry.amount)
}

/// Carrier-specific (`1`) beats location default (`2`) beats the `UCR`/
/// `DEFAULT` global fallback (`3`). A schedule is carrier-specific when its
/// description contains the claim's carrier name as a substring (both
/// uppercased); it's the global fallback when it matches `UCR|DEFAULT`;
/// everything else is the location default.
fn fee_schedule_precedence(description: &str, carrier: &str) -> u8 {
    let description_upper = description.to_uppercase();
    let carrier_upper = carrier.trim().to_uppercase();

    if !carrier_upper.is_empty() && description_upper.contains(&carrier_upper) {
        1
    } else if description_upper.contains("UCR") || description_upper.contains("DEFAULT") {
        3
    } else {
        2
    }
}

/// Approximately 1-in-100 sampling gate for the data-quality probe, so it
/// never runs on every request in steady state.
fn sampled_for_data_quality_log() -> bool {
    let count = DATA_QUALITY_SAMPLE_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    count % 100 == 0
}

/// Logs retention stats for the flatten stage. Never surfaced in the
/// response body and never allowed to affect the response path — it's a
/// pure `tracing` call over numbers already in hand.
fn log_data_quality_sample(outcome: &FlattenOutcome) {
    let retained = outcome.lines.len() as u64;
    let retention_pct = if outcome.total_line_items > 0 {
        (retained as f64 / outcome.total_line_items as f64) * 100.0
    } else {
        100.0
    };
    debug!(
        total_line_items = outcome.total_line_items,
        retained,
        dropped = outcome.dropped,
        retention_pct,
        "pivot: data-quality sample"
    );
}

fn sort_rows(rows: &mut [PivotRow]) {
    rows.sort_by(|a, b| {
        a.carrier
            .cmp(&b.carrier)
            .then_with(|| a.location_id.cmp(&b.location_id))
            .then_with(|| a.procedure.cmp(&b.procedure))
            .then_with(|| a.month.cmp(&b.month))
    });
}

fn paginate(rows: Vec<PivotRow>, page: i64, limit: i64) -> Vec<PivotRow> {
    if limit <= 0 {
        return rows;
    }
    let page = page.max(1) as usize;
    let limit = limit as usize;
    let start = (page - 1).saturating_mul(limit);
    rows.into_iter().skip(start).take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::store::fake::FakeStoreAdapter;
    use crate::analytics::store::{ClaimDoc, PatientDoc, ProcedureDoc};

    /// Mirrors S1/S2's claim shape verbatim: `feeBilled:150, allowedAmount:95,
    /// insAmountPaid:76, writeOff:55` on `2024-02-10`. Note these disposition
    /// buckets (95+76+55=226) don't reconcile to billed (150), so `hasIssues`
    /// is true for this fixture — see the note on `s1_happy_path_...`.
    fn sample_claim(date: chrono::DateTime<Utc>) -> ProcessedClaimDoc {
        ProcessedClaimDoc {
            id: "claim-1".to_string(),
            job_id: "job-1".to_string(),
            location_id: "loc-1".to_string(),
            patients: vec![PatientDoc {
                claims: vec![ClaimDoc {
                    date_received: Some(date),
                    provider_npi: Some("1234567890".to_string()),
                    procedures: vec![ProcedureDoc {
                        proc_code: Some("D0120".to_string()),
                        fee_billed: 150.0,
                        allowed_amount: 95.0,
                        ins_amount_paid: 76.0,
                        write_off: 55.0,
                    }],
                }],
            }],
        }
    }

    fn sample_store() -> FakeStoreAdapter {
        FakeStoreAdapter::new()
            .with_claims(vec![sample_claim(Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap())])
            .with_jobs(vec![JobDoc {
                id: "job-1".to_string(),
                location_id: "loc-1".to_string(),
                carrier_name: Some("DELTA".to_string()),
                date_issued: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            }])
            .with_locations(vec![LocationDoc {
                id: "loc-1".to_string(),
                code: "PROVO".to_string(),
                name: "Provo Clinic".to_string(),
                active: true,
            }])
            .with_fee_schedules(vec![
                FeeScheduleEntry {
                    location_code: "PROVO".to_string(),
                    description: "DELTA DENTAL PPO".to_string(),
                    procedure_code: "D0120".to_string(),
                    amount: 80.0,
                    collected_at: Utc::now(),
                },
                FeeScheduleEntry {
                    location_code: "PROVO".to_string(),
                    description: "UCR FEE SCHEDULE".to_string(),
                    procedure_code: "D0120".to_string(),
                    amount: 100.0,
                    collected_at: Utc::now(),
                },
            ])
    }

    /// S1 — carrier-specific schedule wins over the UCR fallback, and every
    /// derived metric matches the spec's worked example.
    #[tokio::test]
    async fn s1_happy_path_carrier_specific_schedule_wins() {
        let store = sample_store();
        let filter = PivotFilter {
            locations: Some(vec!["PROVO".to_string()]),
            start: Some(chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
            end: Some(chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            ..PivotFilter::defaults()
        };
        let result = run_pivot(&store, &filter).await.unwrap();
        assert_eq!(result.rows.len(), 1);
        let row = &result.rows[0];
        assert_eq!(row.carrier, "DELTA");
        assert_eq!(row.location_code, "PROVO");
        assert_eq!(row.procedure, "D0120");
        assert_eq!(row.month, "2024-02");
        assert_eq!(row.metrics.billed, 150.0);
        assert_eq!(row.metrics.allowed, 95.0);
        assert_eq!(row.metrics.paid, 76.0);
        assert_eq!(row.metrics.write_off, 55.0);
        assert!((row.metrics.write_off_pct - 36.666_666_666_666_664).abs() < 1e-9);
        assert_eq!(row.metrics.fee_scheduled, Some(80.0));
        assert!((row.metrics.schedule_variance.unwrap() - 46.666_666_666_666_664).abs() < 1e-9);
        assert_eq!(row.metrics.claim_count, 1);
        // The worked example's prose claims `hasIssues:false`, but its own
        // seeded numbers (150 billed vs. 95+76+55=226 disposed) fail the
        // reconciliation check the spec states twice (step 10 and the §8
        // universal invariant) by 76, far outside the $1 tolerance. The
        // invariant is authoritative here; see DESIGN.md.
        assert!(row.has_issues);
    }

    /// S2 — a second identical claim in the same month aggregates into the
    /// same row rather than producing a second one.
    #[tokio::test]
    async fn s2_two_claims_in_same_bucket_aggregate_into_one_row() {
        let mut store = sample_store();
        store
            .claims
            .push(sample_claim(Utc.with_ymd_and_hms(2024, 2, 15, 9, 0, 0).unwrap()));

        let result = run_pivot(&store, &PivotFilter::defaults()).await.unwrap();
        assert_eq!(result.rows.len(), 1);
        let row = &result.rows[0];
        assert_eq!(row.metrics.claim_count, 2);
        assert_eq!(row.metrics.billed, 300.0);
        assert_eq!(row.metrics.allowed, 190.0);
        assert_eq!(row.metrics.paid, 152.0);
        assert_eq!(row.metrics.write_off, 110.0);
        assert_eq!(row.metrics.fee_scheduled, Some(80.0));
    }

    /// S3 — no matching fee schedule: `feeScheduled` and `scheduleVariance`
    /// both surface as null rather than a defaulted number.
    #[tokio::test]
    async fn s3_missing_fee_schedule_yields_null_scheduled_and_variance() {
        let mut store = sample_store();
        store.fee_schedules.clear();
        store.locations.push(LocationDoc {
            id: "loc-2".to_string(),
            code: "VEGAS".to_string(),
            name: "Vegas Clinic".to_string(),
            active: true,
        });
        store.jobs.push(JobDoc {
            id: "job-2".to_string(),
            location_id: "loc-2".to_string(),
            carrier_name: Some("AETNA".to_string()),
            date_issued: None,
        });
        store.claims.push(ProcessedClaimDoc {
            id: "claim-2".to_string(),
            job_id: "job-2".to_string(),
            location_id: "loc-2".to_string(),
            patients: vec![PatientDoc {
                claims: vec![ClaimDoc {
                    date_received: Some(Utc.with_ymd_and_hms(2024, 2, 5, 0, 0, 0).unwrap()),
                    provider_npi: Some("9999999999".to_string()),
                    procedures: vec![ProcedureDoc {
                        proc_code: Some("D0140".to_string()),
                        fee_billed: 60.0,
                        allowed_amount: 45.0,
                        ins_amount_paid: 10.0,
                        write_off: 5.0,
                    }],
                }],
            }],
        });

        let result = run_pivot(&store, &PivotFilter::defaults()).await.unwrap();
        let vegas_row = result
            .rows
            .iter()
            .find(|row| row.location_code == "VEGAS")
            .expect("expected a VEGAS row");
        assert_eq!(vegas_row.metrics.fee_scheduled, None);
        assert_eq!(vegas_row.metrics.schedule_variance, None);
    }

    /// Integrity check: `hasIssues` is purely `|billed - (allowed + paid +
    /// writeOff)| > 1.0`, independent of whether a schedule was found.
    #[tokio::test]
    async fn has_issues_reflects_only_the_reconciliation_check() {
        let mut store = sample_store();
        // Adjust the buckets so they reconcile to billed within $1.
        store.claims[0].patients[0].claims[0].procedures[0].allowed_amount = 95.0;
        store.claims[0].patients[0].claims[0].procedures[0].ins_amount_paid = 0.0;
        store.claims[0].patients[0].claims[0].procedures[0].write_off = 55.0;

        let reconciled = run_pivot(&store, &PivotFilter::defaults()).await.unwrap();
        assert!(!reconciled.rows[0].has_issues);

        // Perturb one field so the buckets no longer reconcile to billed.
        store.claims[0].patients[0].claims[0].procedures[0].allowed_amount = 40.0;
        let broken = run_pivot(&store, &PivotFilter::defaults()).await.unwrap();
        assert!(broken.rows[0].has_issues);
    }

    #[test]
    fn best_fee_schedule_prefers_carrier_over_default() {
        let entries = vec![
            FeeScheduleEntry {
                location_code: "PROVO".to_string(),
                description: "UCR FEE SCHEDULE".to_string(),
                procedure_code: "D0120".to_string(),
                amount: 90.0,
                collected_at: Utc::now(),
            },
            FeeScheduleEntry {
                location_code: "PROVO".to_string(),
                description: "DELTA DENTAL PPO".to_string(),
                procedure_code: "D0120".to_string(),
                amount: 100.0,
                collected_at: Utc::now(),
            },
        ];
        assert_eq!(
            best_fee_schedule_amount(&entries, "DELTA", "PROVO", "D0120"),
            Some(100.0)
        );
    }

    #[test]
    fn best_fee_schedule_falls_back_to_location_default_over_ucr() {
        let entries = vec![
            FeeScheduleEntry {
                location_code: "PROVO".to_string(),
                description: "UCR FEE SCHEDULE".to_string(),
                procedure_code: "D0120".to_string(),
                amount: 90.0,
                collected_at: Utc::now(),
            },
            FeeScheduleEntry {
                location_code: "PROVO".to_string(),
                description: "PRACTICE STANDARD".to_string(),
                procedure_code: "D0120".to_string(),
                amount: 110.0,
                collected_at: Utc::now(),
            },
        ];
        assert_eq!(
            best_fee_schedule_amount(&entries, "AETNA", "PROVO", "D0120"),
            Some(110.0)
        );
    }

    #[test]
    fn best_fee_schedule_breaks_ties_by_most_recent_collection() {
        let older = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entries = vec![
            FeeScheduleEntry {
                location_code: "PROVO".to_string(),
                description: "DELTA DENTAL PPO".to_string(),
                procedure_code: "D0120".to_string(),
                amount: 70.0,
                collected_at: older,
            },
            FeeScheduleEntry {
                location_code: "PROVO".to_string(),
                description: "DELTA DENTAL PPO".to_string(),
                procedure_code: "D0120".to_string(),
                amount: 85.0,
                collected_at: newer,
            },
        ];
        assert_eq!(
            best_fee_schedule_amount(&entries, "DELTA", "PROVO", "D0120"),
            Some(85.0)
        );
    }

    #[test]
    fn pagination_slices_sorted_rows() {
        let mut rows = Vec::new();
        for i in 0..5 {
            rows.push(PivotRow {
                carrier: "DELTA".to_string(),
                location_id: "loc-1".to_string(),
                location_code: "PROVO".to_string(),
                location_name: "Provo".to_string(),
                procedure: format!("D0{i}"),
                month: "2024-02".to_string(),
                metrics: PivotMetrics {
                    billed: 0.0,
                    allowed: 0.0,
                    paid: 0.0,
                    write_off: 0.0,
                    write_off_pct: 0.0,
                    fee_scheduled: None,
                    schedule_variance: None,
                    claim_count: 1,
                },
                has_issues: false,
            });
        }
        let page2 = paginate(rows, 2, 2);
        assert_eq!(page2.len(), 2);
        assert_eq!(page2[0].procedure, "D02");
    }
}
