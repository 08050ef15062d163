//! Configuration Management
//!
//! Layered configuration for bqtour. Precedence, highest first:
//! command-line flags, `BQTOUR_*` environment variables, the JSON config
//! file, then built-in defaults.
//!
//! ```json
//! {
//!   "project_id": "my-project",
//!   "auth": {
//!     "key_file": "/path/to/service-account.json",
//!     "client_secret": "/path/to/client_secret.json",
//!     "token_cache": "/path/to/bigquery_credentials.json"
//!   },
//!   "endpoint": "https://bigquery.googleapis.com",
//!   "poll": { "initial_backoff_ms": 500, "max_backoff_ms": 8000, "timeout_secs": 300 }
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com";

pub const ENV_PROJECT: &str = "BQTOUR_PROJECT";
pub const ENV_KEY_FILE: &str = "BQTOUR_KEY_FILE";
pub const ENV_CLIENT_SECRET: &str = "BQTOUR_CLIENT_SECRET";
pub const ENV_TOKEN_CACHE: &str = "BQTOUR_TOKEN_CACHE";
pub const ENV_ENDPOINT: &str = "BQTOUR_ENDPOINT";
pub const ENV_ACCESS_TOKEN: &str = "BQTOUR_ACCESS_TOKEN";

/// Full tour configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct TourConfig {
    /// Project to run the tour in
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Base URL of the BigQuery API, without the `/bigquery/v2` suffix
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub poll: PollConfig,
}

/// Where credentials come from
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AuthConfig {
    /// Service-account key file. Used when it exists.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// OAuth client-secret descriptor for the installed-app flow
    #[serde(default)]
    pub client_secret: Option<PathBuf>,
    /// Where the installed-app flow stores its refresh token
    #[serde(default)]
    pub token_cache: Option<PathBuf>,
    /// Fixed bearer token; skips every other source
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
}

/// Job and query polling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PollConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PollConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TourConfig {
    /// Default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bqtour").join("config.json"))
    }

    /// Default location of the OAuth token cache
    pub fn default_token_cache() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bqtour").join("bigquery_credentials.json"))
    }

    /// Load configuration from `path`, or from the default path when `None`.
    ///
    /// A missing default file yields the defaults. A missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::config_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(Error::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Overlay `BQTOUR_*` environment variables
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(project) = var(ENV_PROJECT) {
            self.project_id = Some(project);
        }
        if let Some(key_file) = var(ENV_KEY_FILE) {
            self.auth.key_file = Some(PathBuf::from(key_file));
        }
        if let Some(secret) = var(ENV_CLIENT_SECRET) {
            self.auth.client_secret = Some(PathBuf::from(secret));
        }
        if let Some(cache) = var(ENV_TOKEN_CACHE) {
            self.auth.token_cache = Some(PathBuf::from(cache));
        }
        if let Some(endpoint) = var(ENV_ENDPOINT) {
            self.endpoint = Some(endpoint);
        }
        if let Some(token) = var(ENV_ACCESS_TOKEN) {
            self.auth.access_token = Some(token);
        }
    }

    /// Get effective endpoint (config > default), without a trailing slash
    pub fn effective_endpoint(&self) -> String {
        self.endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string()
    }

    /// Get effective project (config > gcloud default)
    pub fn effective_project(&self) -> Result<String> {
        self.project_id
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(crate::gcp::auth::get_default_project)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no project configured; pass PROJECT_ID, set {ENV_PROJECT}, or set a gcloud default project"
                ))
            })
    }

    /// Token cache path, falling back to the per-user default
    pub fn effective_token_cache(&self) -> Option<PathBuf> {
        self.auth
            .token_cache
            .clone()
            .or_else(Self::default_token_cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = TourConfig::default();
        assert_eq!(config.effective_endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.poll.initial_backoff(), Duration::from_millis(500));
        assert_eq!(config.poll.max_backoff(), Duration::from_secs(8));
        assert_eq!(config.poll.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: TourConfig =
            serde_json::from_str(r#"{"project_id": "tour-project", "poll": {"timeout_secs": 5}}"#)
                .unwrap();
        assert_eq!(config.project_id.as_deref(), Some("tour-project"));
        assert_eq!(config.poll.timeout_secs, 5);
        assert_eq!(config.poll.initial_backoff_ms, 500);
        assert!(config.auth.key_file.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = TourConfig {
            project_id: Some("from-file".into()),
            endpoint: Some("http://file".into()),
            ..Default::default()
        };
        let vars: HashMap<&str, &str> = [
            (ENV_PROJECT, "from-env"),
            (ENV_KEY_FILE, "/keys/sa.json"),
            (ENV_ENDPOINT, "http://localhost:9050/"),
            (ENV_CLIENT_SECRET, "  "),
        ]
        .into_iter()
        .collect();

        config.apply_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.project_id.as_deref(), Some("from-env"));
        assert_eq!(config.auth.key_file, Some(PathBuf::from("/keys/sa.json")));
        assert!(config.auth.client_secret.is_none());
        assert_eq!(config.effective_endpoint(), "http://localhost:9050");
    }

    #[test]
    fn test_max_backoff_never_below_initial() {
        let poll = PollConfig {
            initial_backoff_ms: 2_000,
            max_backoff_ms: 100,
            timeout_secs: 1,
        };
        assert_eq!(poll.max_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = TourConfig::load(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
