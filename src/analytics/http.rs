//! HTTP surface (C7): the six analytics routes. JSON/CSV responses are built
//! from the pivot and credentialing engines, with the response cache checked
//! ahead of the store and populated on a miss.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, RawQuery};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use tracing::error;

use super::credentialing::run_credentialing;
use super::csv::{credentialing_to_csv, pivot_to_csv};
use super::errors::EngineError;
use super::filters::{
    canonical_credentialing_filter, canonical_pivot_filter, normalize_credentialing_filter,
    normalize_pivot_filter, ParamBag,
};
use super::pivot::run_pivot_with_sampling;
use super::state::AnalyticsState;

const PIVOT_SURFACE: &str = "pivot";
const CREDENTIALING_SURFACE: &str = "credentialing";

fn cache_header_name() -> header::HeaderName {
    header::HeaderName::from_static("x-cache")
}

fn csv_response(body: String, filename: &str) -> Response {
    let disposition = format!("attachment; filename=\"{filename}\"");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

/// Runs a store aggregation under the engine's configured deadline,
/// surfacing `StoreTimeout` rather than letting the request hang.
async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, EngineError>
where
    F: std::future::Future<Output = Result<T, EngineError>>,
{
    tokio::time::timeout(deadline, fut)
        .await
        .unwrap_or(Err(EngineError::StoreTimeout))
}

fn with_cache_header(mut response: Response, hit: bool) -> Response {
    let value = if hit { "HIT" } else { "MISS" };
    response
        .headers_mut()
        .insert(cache_header_name(), HeaderValue::from_static(value));
    response
}

pub async fn pivot_json(
    Extension(state): Extension<Arc<AnalyticsState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, EngineError> {
    let bag = ParamBag::parse(raw_query.as_deref().unwrap_or(""));
    let filter = normalize_pivot_filter(&bag);
    let canonical = canonical_pivot_filter(&filter);
    let fingerprint = super::cache::ResponseCache::fingerprint(PIVOT_SURFACE, &canonical);

    let now = Utc::now();
    if let Some(cached) = state.cache.lookup(&fingerprint, now) {
        return Ok(with_cache_header(Json(cached).into_response(), true));
    }

    let result = with_deadline(
        state.config.aggregation_timeout(),
        run_pivot_with_sampling(state.store.as_ref(), &filter, state.config.debug_pivot),
    )
    .await
    .map_err(|err| {
        if let EngineError::StoreUnavailable(detail) = &err {
            error!(error = %detail, "pivot engine failed to read store");
        }
        err
    })?;

    let payload = serde_json::to_value(&result).unwrap_or(serde_json::Value::Null);
    state.cache.insert(fingerprint, payload.clone(), now);
    Ok(with_cache_header(Json(payload).into_response(), false))
}

pub async fn pivot_csv(
    Extension(state): Extension<Arc<AnalyticsState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, EngineError> {
    let bag = ParamBag::parse(raw_query.as_deref().unwrap_or(""));
    // CSV export ignores pagination; the whole filtered set is streamed.
    let mut filter = normalize_pivot_filter(&bag);
    filter.page = 1;
    filter.limit = i64::MAX;

    let result = with_deadline(
        state.config.aggregation_timeout(),
        run_pivot_with_sampling(state.store.as_ref(), &filter, state.config.debug_pivot),
    )
    .await
    .map_err(|err| {
        if let EngineError::StoreUnavailable(detail) = &err {
            error!(error = %detail, "pivot csv export failed to read store");
        }
        err
    })?;

    Ok(csv_response(pivot_to_csv(&result.rows), "pivot.csv"))
}

pub async fn pivot_data_redirect(RawQuery(raw_query): RawQuery) -> Response {
    let bag = ParamBag::parse(raw_query.as_deref().unwrap_or(""));
    let filter = normalize_pivot_filter(&bag);
    let canonical = canonical_pivot_filter(&filter);
    let location = if canonical.is_empty() {
        "/api/fee-strategy/pivot".to_string()
    } else {
        format!("/api/fee-strategy/pivot?{canonical}")
    };

    (
        StatusCode::FOUND,
        [(header::LOCATION, location)],
    )
        .into_response()
}

pub async fn credentialing_json(
    Extension(state): Extension<Arc<AnalyticsState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, EngineError> {
    let bag = ParamBag::parse(raw_query.as_deref().unwrap_or(""));
    let filter = normalize_credentialing_filter(&bag);
    let canonical = canonical_credentialing_filter(&filter);
    let fingerprint = super::cache::ResponseCache::fingerprint(CREDENTIALING_SURFACE, &canonical);

    let now = Utc::now();
    if let Some(cached) = state.cache.lookup(&fingerprint, now) {
        return Ok(with_cache_header(Json(cached).into_response(), true));
    }

    let rows = with_deadline(
        state.config.aggregation_timeout(),
        run_credentialing(state.store.as_ref(), &filter),
    )
    .await
    .map_err(|err| {
        if let EngineError::StoreUnavailable(detail) = &err {
            error!(error = %detail, "credentialing engine failed to read store");
        }
        err
    })?;

    let payload = serde_json::to_value(&rows).unwrap_or(serde_json::Value::Null);
    state.cache.insert(fingerprint, payload.clone(), now);
    Ok(with_cache_header(Json(payload).into_response(), false))
}

pub async fn credentialing_csv(
    Extension(state): Extension<Arc<AnalyticsState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Response, EngineError> {
    let bag = ParamBag::parse(raw_query.as_deref().unwrap_or(""));
    let filter = normalize_credentialing_filter(&bag);

    let rows = with_deadline(
        state.config.aggregation_timeout(),
        run_credentialing(state.store.as_ref(), &filter),
    )
    .await
    .map_err(|err| {
        if let EngineError::StoreUnavailable(detail) = &err {
            error!(error = %detail, "credentialing csv export failed to read store");
        }
        err
    })?;

    Ok(csv_response(
        credentialing_to_csv(&rows),
        "credentialing.csv",
    ))
}

/// Closed route set per `SPEC_FULL.md` §4.7: anything else is a 404 with the
/// engine's uniform error body, never axum's bare default response.
pub async fn not_found() -> Response {
    EngineError::NotFound.into_response()
}

pub async fn health(Extension(state): Extension<Arc<AnalyticsState>>) -> Response {
    let probe = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        state.store.health_probe(),
    )
    .await;

    match probe {
        Ok(Ok(report)) if report.ok => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "timestamp": Utc::now().to_rfc3339(),
            })),
        )
            .into_response(),
        Ok(Ok(report)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "timestamp": Utc::now().to_rfc3339(),
                "violations": report.violations,
            })),
        )
            .into_response(),
        Ok(Err(err)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "timestamp": Utc::now().to_rfc3339(),
                "error": err.to_string(),
            })),
        )
            .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "timestamp": Utc::now().to_rfc3339(),
                "error": "health probe timed out",
            })),
        )
            .into_response(),
    }
}
