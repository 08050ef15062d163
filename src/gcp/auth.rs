//! GCP Authentication
//!
//! Resolves credentials for the BigQuery API. In order, it tries a
//! service-account key file, then the installed-app OAuth flow with its
//! on-disk token cache, then Application Default Credentials.

use super::client::AuthorizedClient;
use super::http::GcpHttpClient;
use super::oauth::{ConsentPrompt, InstalledFlow, StdinPrompt, UserToken};
use crate::config::AuthConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scope requested for every token
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 60;

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL_SECS: i64 = 30 * 60;

/// Where a token comes from
#[derive(Clone)]
enum Source {
    #[cfg(feature = "service-account")]
    Provider {
        provider: Arc<dyn gcp_auth::TokenProvider>,
        kind: &'static str,
    },
    User(Arc<InstalledFlow>),
    Static(String),
}

/// Resolved credentials with an in-memory token cache
#[derive(Clone)]
pub struct Credentials {
    source: Source,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        let expires_at = expires_at
            .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(DEFAULT_TOKEN_TTL_SECS))
            - chrono::Duration::seconds(TOKEN_EXPIRY_BUFFER_SECS);
        Self { token, expires_at }
    }

    /// Check if this cached token is still valid
    fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("source", &self.kind())
            .finish_non_exhaustive()
    }
}

impl Credentials {
    fn from_source(source: Source) -> Self {
        Self {
            source,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Credentials that always hand out `token`. Meant for emulators and tests.
    pub fn from_static_token(token: impl Into<String>) -> Self {
        Self::from_source(Source::Static(token.into()))
    }

    /// Short description of the credential source
    pub fn kind(&self) -> &'static str {
        match &self.source {
            #[cfg(feature = "service-account")]
            Source::Provider { kind, .. } => *kind,
            Source::User(_) => "user OAuth",
            Source::Static(_) => "static token",
        }
    }

    /// Get an access token for API calls
    /// Security: Checks token expiry before returning cached token
    pub async fn token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let fresh = self.fetch().await?;
        let token = fresh.token.clone();

        tracing::debug!("New {} token cached, valid until {}", self.kind(), fresh.expires_at);
        *self.token_cache.write().await = Some(fresh);

        Ok(token)
    }

    async fn fetch(&self) -> Result<CachedToken> {
        match &self.source {
            #[cfg(feature = "service-account")]
            Source::Provider { provider, .. } => {
                let token = provider.token(&[BIGQUERY_SCOPE]).await?;
                Ok(CachedToken::new(
                    token.as_str().to_string(),
                    Some(token.expires_at()),
                ))
            }
            Source::User(flow) => {
                let UserToken {
                    access_token,
                    expires_at,
                } = flow.access_token().await?;
                Ok(CachedToken::new(access_token, expires_at))
            }
            Source::Static(token) => Ok(CachedToken {
                token: token.clone(),
                expires_at: DateTime::<Utc>::MAX_UTC,
            }),
        }
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        *self.token_cache.write().await = None;
        self.token().await
    }

    /// Wrap a bare HTTP transport with these credentials
    pub fn authorize(self, http: GcpHttpClient) -> AuthorizedClient {
        AuthorizedClient::new(self, http)
    }
}

/// Resolves [`Credentials`] from an [`AuthConfig`]
pub struct CredentialProvider {
    config: AuthConfig,
    token_cache: Option<PathBuf>,
    prompt: Arc<dyn ConsentPrompt>,
}

impl CredentialProvider {
    pub fn new(config: AuthConfig, token_cache: Option<PathBuf>) -> Self {
        Self {
            config,
            token_cache,
            prompt: Arc::new(StdinPrompt),
        }
    }

    /// Replace the interactive consent prompt
    pub fn with_prompt(mut self, prompt: Arc<dyn ConsentPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Resolve credentials and make sure a first token can be obtained
    pub async fn get_credentials(&self) -> Result<Credentials> {
        if let Some(token) = &self.config.access_token {
            tracing::info!("Using static access token");
            return Ok(Credentials::from_static_token(token.clone()));
        }

        if let Some(key_file) = self.config.key_file.as_ref().filter(|p| p.exists()) {
            tracing::info!("Using service-account key file {:?}", key_file);
            return service_account_credentials(key_file);
        }

        if let Some(secret) = &self.config.client_secret {
            let cache = self.token_cache.clone().ok_or_else(|| {
                Error::Config("no token cache path available for the OAuth flow".into())
            })?;
            tracing::info!("Using installed-app OAuth flow with client secret {:?}", secret);

            let http = GcpHttpClient::new()?;
            let flow = InstalledFlow::load(secret, cache, http, Arc::clone(&self.prompt))?;
            flow.ensure_authorized().await?;

            return Ok(Credentials::from_source(Source::User(Arc::new(flow))));
        }

        application_default_credentials().await
    }
}

#[cfg(feature = "service-account")]
fn service_account_credentials(key_file: &std::path::Path) -> Result<Credentials> {
    let account = gcp_auth::CustomServiceAccount::from_file(key_file)?;
    Ok(Credentials::from_source(Source::Provider {
        provider: Arc::new(account),
        kind: "service account",
    }))
}

#[cfg(not(feature = "service-account"))]
fn service_account_credentials(_key_file: &std::path::Path) -> Result<Credentials> {
    Err(Error::MissingCryptoSupport)
}

#[cfg(feature = "service-account")]
async fn application_default_credentials() -> Result<Credentials> {
    tracing::info!("Falling back to application default credentials");
    let provider = gcp_auth::provider().await.map_err(|e| {
        tracing::warn!("Application default credentials unavailable: {}", e);
        Error::NoCredentials
    })?;
    Ok(Credentials::from_source(Source::Provider {
        provider,
        kind: "application default",
    }))
}

#[cfg(not(feature = "service-account"))]
async fn application_default_credentials() -> Result<Credentials> {
    Err(Error::NoCredentials)
}

/// The `Authorization` header line for manual HTTP testing
pub async fn auth_header(credentials: &Credentials) -> Result<String> {
    Ok(format!("Authorization: Bearer {}", credentials.token().await?))
}

/// Get the gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    // Check CLOUDSDK_CONFIG environment variable first
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    // Default to ~/.config/gcloud on Linux/macOS
    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Validate a GCP project ID format
/// Project IDs must be 6-30 characters, lowercase letters, digits, and hyphens
/// Must start with a letter and cannot end with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    match project.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Pull `project = ...` out of an ini-style gcloud file, optionally only from `[core]`
fn project_from_ini(content: &str, core_only: bool) -> Option<String> {
    let mut in_core_section = !core_only;
    for line in content.lines() {
        let line = line.trim();
        // Security: Skip comments and empty lines
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line == "[core]" {
            in_core_section = true;
        } else if line.starts_with('[') {
            in_core_section = !core_only;
        } else if in_core_section {
            if let Some((key, value)) = line.split_once('=') {
                let project = value.trim();
                if key.trim() == "project" && validate_project_id(project) {
                    return Some(project.to_string());
                }
            }
        }
    }
    None
}

/// Read the default project from the environment or gcloud configuration
/// Security: Validates project ID format before returning
pub fn get_default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }

    let config_dir = get_gcloud_config_dir()?;

    if let Ok(content) = std::fs::read_to_string(config_dir.join("properties")) {
        if let Some(project) = project_from_ini(&content, false) {
            return Some(project);
        }
    }

    let active_config = std::fs::read_to_string(config_dir.join("active_config")).ok()?;
    let config_name = active_config.trim();

    // Security: Validate config name to prevent path traversal
    if !config_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Invalid characters in active_config name");
        return None;
    }

    let config_path = config_dir
        .join("configurations")
        .join(format!("config_{}", config_name));

    let content = std::fs::read_to_string(config_path).ok()?;
    project_from_ini(&content, true)
}
