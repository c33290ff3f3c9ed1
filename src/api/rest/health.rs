use axum::Json;

/// Liveness endpoint for the legacy expense workflow reference controllers.
///
/// Kept alongside the other preserved legacy handlers; unrelated to the
/// analytics engine's `/health` route, which lives at `crate::analytics::http::health`
/// and is mounted by `crate::analytics::router`, not this module's `router()`.
pub async fn healthcheck() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
