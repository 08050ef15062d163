//! BigQuery v2 REST API
//!
//! Typed wrappers over the resource verbs the tour uses.
//!
//! # Module Structure
//!
//! - [`types`] - request and response models
//! - [`datasets`] - `datasets.{insert,patch,list,get,delete}`
//! - [`tables`] - `tables.{insert,update,patch,list,get,delete}`
//! - [`tabledata`] - `tabledata.list`
//! - [`jobs`] - `jobs.{insert,list,get,query,getQueryResults}`
//! - [`poll`] - bounded exponential backoff for job and query polling

pub mod datasets;
pub mod jobs;
pub mod poll;
pub mod tabledata;
pub mod tables;
pub mod types;

use crate::error::Result;
use crate::gcp::client::AuthorizedClient;
use serde::de::DeserializeOwned;
use types::Page;

/// Authorized handle to BigQuery v2
#[derive(Clone, Debug)]
pub struct BigQueryClient {
    pub http: AuthorizedClient,
    endpoint: String,
}

impl BigQueryClient {
    /// `endpoint` is the API root, e.g. `https://bigquery.googleapis.com`
    pub fn new(http: AuthorizedClient, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build a `bigquery/v2` URL from path segments, percent-encoding each one
    pub fn api_url(&self, segments: &[&str]) -> String {
        format!("{}/bigquery/v2/{}", self.endpoint, encode_segments(segments))
    }

    /// Build an upload URL for media endpoints
    pub fn upload_url(&self, segments: &[&str]) -> String {
        format!(
            "{}/upload/bigquery/v2/{}",
            self.endpoint,
            encode_segments(segments)
        )
    }

    /// Follow `nextPageToken` until every page of a list call is collected
    pub(crate) async fn list_all<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = query.to_vec();
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let page: Page<T> = self.http.get(url, &params).await?;
            all_items.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(all_items)
    }
}

fn encode_segments(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::auth::Credentials;
    use crate::gcp::http::GcpHttpClient;

    fn client(endpoint: &str) -> BigQueryClient {
        let http = Credentials::from_static_token("t").authorize(GcpHttpClient::new().unwrap());
        BigQueryClient::new(http, endpoint)
    }

    #[test]
    fn test_api_url_encodes_segments() {
        let bq = client("https://bigquery.googleapis.com/");
        assert_eq!(
            bq.api_url(&["projects", "p", "datasets", "a b"]),
            "https://bigquery.googleapis.com/bigquery/v2/projects/p/datasets/a%20b"
        );
        assert_eq!(
            bq.upload_url(&["projects", "p", "jobs"]),
            "https://bigquery.googleapis.com/upload/bigquery/v2/projects/p/jobs"
        );
    }
}
