//! The dental-practice fee-strategy and credentialing analytics engine.
//!
//! Pipeline: [`filters`] normalizes a raw query string, [`cache`] short
//! circuits repeat requests, [`store`] abstracts the underlying document
//! store, [`pivot`] and [`credentialing`] compute the two report shapes, and
//! [`csv`] renders either as the CSV export surfaces expect. [`http`] wires
//! all of it to the six routes in `SPEC_FULL.md` §4.7.

pub mod cache;
pub mod credentialing;
pub mod csv;
pub mod errors;
pub mod filters;
pub mod http;
pub mod models;
pub mod pivot;
pub mod state;
pub mod store;

use axum::routing::get;
use axum::Router;

pub fn router() -> Router {
    Router::new()
        .route("/api/fee-strategy/pivot", get(http::pivot_json))
        .route("/api/fee-strategy/pivot.csv", get(http::pivot_csv))
        .route("/fee-strategy/pivot-data", get(http::pivot_data_redirect))
        .route("/api/credentialing/status", get(http::credentialing_json))
        .route("/api/credentialing/export.csv", get(http::credentialing_csv))
        .route("/health", get(http::health))
        .fallback(http::not_found)
}
