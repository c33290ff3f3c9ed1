//! Read-only analytics engine over dental-practice claims, credentialing, and
//! fee-schedule data.
//!
//! The `analytics` module is the core covered by `SPEC_FULL.md`: filter
//! normalization, the response cache, CSV serialization, the store adapter,
//! and the two aggregation engines (fee-strategy pivot, credentialing
//! status). `domain`, `services`, `validation`, `jobs`, and the `rest`
//! handlers under `api` predating this engine are an unrelated expense
//! management workflow preserved as reference, per `SPEC_FULL.md` §1 — they
//! are compiled but not mounted into the analytics router built in `api`.

pub mod analytics;
pub mod api;
pub mod domain;
pub mod infrastructure;
pub mod jobs;
pub mod services;
pub mod telemetry;
pub mod validation;
