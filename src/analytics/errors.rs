//! Error kinds the analytics engine distinguishes, mirroring the shape of
//! `services::errors::ServiceError` from the legacy workflow but scoped to a
//! read-only store.

use axum::{http::StatusCode, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("store timeout")]
    StoreTimeout,
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Surfaced only if an external authenticator hands the engine a
    /// rejection to translate; the engine itself never authenticates a
    /// request, per `SPEC_FULL.md` §1's "external collaborators" list.
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
}

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::StoreTimeout => StatusCode::GATEWAY_TIMEOUT,
            EngineError::BadRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
            EngineError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn message(&self) -> String {
        match self {
            // The store-unavailable detail is logged by the caller via
            // `tracing`, never echoed to the client.
            EngineError::StoreUnavailable(_) => "Internal server error".to_string(),
            EngineError::StoreTimeout => self.to_string(),
            EngineError::BadRequest(msg) => msg.clone(),
            EngineError::Unauthorized => self.to_string(),
            EngineError::NotFound => self.to_string(),
        }
    }

    pub fn into_response_parts(self) -> (StatusCode, Json<serde_json::Value>) {
        let status = self.status_code();
        let message = self.message();
        (status, Json(serde_json::json!({ "error": message })))
    }
}

impl axum::response::IntoResponse for EngineError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = self.into_response_parts();
        (status, body).into_response()
    }
}
