//! GCP API interaction module
//!
//! Credentials, the HTTP transport, and project listing.
//!
//! # Module Structure
//!
//! - [`auth`] - credential resolution: service account, user OAuth, or ADC
//! - [`oauth`] - installed-app OAuth flow with an on-disk token cache
//! - [`client`] - authorized client that signs every request
//! - [`http`] - HTTP utilities for REST API calls
//! - [`projects`] - Project listing
//!
//! # Example
//!
//! ```ignore
//! use bqtour::config::TourConfig;
//! use bqtour::gcp::client::build_client;
//!
//! async fn example() -> bqtour::Result<()> {
//!     let client = build_client(&TourConfig::default()).await?;
//!     let projects = bqtour::gcp::projects::list_projects(&client).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod oauth;
pub mod projects;
