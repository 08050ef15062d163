//! Authorized GCP client
//!
//! Combines credentials and the HTTP transport so every request carries a
//! fresh bearer token.

use super::auth::{CredentialProvider, Credentials};
use super::http::GcpHttpClient;
use crate::bigquery::BigQueryClient;
use crate::config::TourConfig;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// HTTP handle that signs every request
#[derive(Clone, Debug)]
pub struct AuthorizedClient {
    pub credentials: Credentials,
    http: GcpHttpClient,
}

impl AuthorizedClient {
    pub fn new(credentials: Credentials, http: GcpHttpClient) -> Self {
        Self { credentials, http }
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.token().await
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T> {
        let token = self.get_token().await?;
        self.http.get(url, &token, query).await
    }

    pub async fn post<B, T>(&self, url: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.get_token().await?;
        self.http.post(url, &token, body).await
    }

    pub async fn patch<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.get_token().await?;
        self.http.patch(url, &token, body).await
    }

    pub async fn put<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.get_token().await?;
        self.http.put(url, &token, body).await
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        let token = self.get_token().await?;
        self.http.delete(url, &token).await
    }

    pub async fn upload<B, T>(&self, url: &str, metadata: &B, media: &[u8], media_type: &str) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.get_token().await?;
        self.http
            .post_multipart(url, &token, metadata, media, media_type)
            .await
    }
}

/// Resolve credentials from `config` and build a BigQuery v2 client
pub async fn build_client(config: &TourConfig) -> Result<BigQueryClient> {
    let credentials = resolve_credentials(config).await?;
    let http = GcpHttpClient::new()?;
    Ok(BigQueryClient::new(
        credentials.authorize(http),
        config.effective_endpoint(),
    ))
}

/// Resolve credentials only, e.g. to print an auth header
pub async fn resolve_credentials(config: &TourConfig) -> Result<Credentials> {
    let credentials = CredentialProvider::new(config.auth.clone(), config.effective_token_cache())
        .get_credentials()
        .await?;
    tracing::info!("Resolved {} credentials", credentials.kind());
    Ok(credentials)
}
