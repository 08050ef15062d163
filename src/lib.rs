//! Guided tour of the BigQuery v2 REST API.
//!
//! [`gcp`] resolves credentials and signs requests, [`bigquery`] wraps the
//! resource verbs, and [`tour`] strings them together into the walkthrough.

pub mod bigquery;
pub mod config;
pub mod error;
pub mod gcp;
pub mod tour;

pub use error::{Error, Result};

/// Version injected at compile time via BQTOUR_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("BQTOUR_VERSION") {
    Some(v) => v,
    None => "dev",
};
