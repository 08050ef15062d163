//! Installed-application OAuth flow
//!
//! Reads an OAuth client-secret descriptor and keeps the user's refresh
//! token in a JSON cache file. On first use the user is sent to the consent
//! page and asked to paste back the authorization code. Later runs only
//! refresh.

use super::auth::BIGQUERY_SCOPE;
use super::http::{sanitize_for_log, GcpHttpClient};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// Seconds of slack before a cached access token counts as expired
const ACCESS_TOKEN_SLACK_SECS: i64 = 60;

/// One entry of a client-secret descriptor
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Client-secret files wrap the secret in `installed` or `web`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClientSecretFile {
    Installed(ClientSecret),
    Web(ClientSecret),
}

impl ClientSecret {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretFile = serde_json::from_str(json)?;
        Ok(match file {
            ClientSecretFile::Installed(secret) | ClientSecretFile::Web(secret) => secret,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read client secret {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT_URI)
    }

    /// Consent page URL the user has to visit
    pub fn authorization_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.auth_uri)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri())
            .append_pair("response_type", "code")
            .append_pair("scope", BIGQUERY_SCOPE)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url)
    }
}

/// Contents of the token cache file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl StoredToken {
    fn is_fresh(&self) -> bool {
        self.expires_at.is_some_and(|at| {
            Utc::now() + chrono::Duration::seconds(ACCESS_TOKEN_SLACK_SECS) < at
        })
    }
}

/// Token endpoint success response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Token endpoint error response
#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Access token handed to [`Credentials`](super::auth::Credentials)
#[derive(Debug, Clone)]
pub struct UserToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Obtains an authorization code from the user
pub trait ConsentPrompt: Send + Sync {
    /// Show `url` and return what the user pasted back
    fn authorization_code(&self, url: &Url) -> Result<String>;
}

/// Prompts on stderr and reads the reply from stdin
pub struct StdinPrompt;

impl ConsentPrompt for StdinPrompt {
    fn authorization_code(&self, url: &Url) -> Result<String> {
        let mut stderr = std::io::stderr().lock();
        writeln!(stderr, "Go to the following link in your browser:\n\n    {url}\n")?;
        write!(
            stderr,
            "After granting access, paste the code (or the full address you were redirected to): "
        )?;
        stderr.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    }
}

/// Pull the authorization code out of what the user pasted
pub fn parse_authorization_reply(reply: &str) -> Result<String> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(Error::Auth("no authorization code entered".into()));
    }

    let Ok(url) = Url::parse(reply) else {
        return Ok(reply.to_string());
    };

    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => {
                return Err(Error::OAuth {
                    error: value.into_owned(),
                    description: None,
                })
            }
            _ => {}
        }
    }

    code.ok_or_else(|| Error::Auth("redirect address carries no `code` parameter".into()))
}

/// Installed-app flow bound to one client secret and one cache file
pub struct InstalledFlow {
    secret: ClientSecret,
    cache_path: PathBuf,
    http: GcpHttpClient,
    prompt: Arc<dyn ConsentPrompt>,
    stored: Mutex<Option<StoredToken>>,
}

impl InstalledFlow {
    /// Load the client secret and whatever the cache currently holds
    pub fn load(
        secret_path: &Path,
        cache_path: PathBuf,
        http: GcpHttpClient,
        prompt: Arc<dyn ConsentPrompt>,
    ) -> Result<Self> {
        let secret = ClientSecret::from_file(secret_path)?;
        Ok(Self::new(secret, cache_path, http, prompt))
    }

    pub fn new(
        secret: ClientSecret,
        cache_path: PathBuf,
        http: GcpHttpClient,
        prompt: Arc<dyn ConsentPrompt>,
    ) -> Self {
        let stored = read_cache(&cache_path);
        Self {
            secret,
            cache_path,
            http,
            prompt,
            stored: Mutex::new(stored),
        }
    }

    /// Make sure a usable token exists, running consent if needed.
    ///
    /// A cached refresh token is used to refresh up front. If the server
    /// rejects it with `invalid_grant`, consent runs again.
    pub async fn ensure_authorized(&self) -> Result<()> {
        let mut stored = self.stored.lock().await;

        let refresh_token = stored.as_ref().and_then(|t| t.refresh_token.clone());
        let token = match refresh_token {
            Some(refresh_token) => match self.refresh(&refresh_token).await {
                Ok(token) => token,
                Err(Error::OAuth { error, .. }) if error == "invalid_grant" => {
                    tracing::warn!("Cached refresh token was rejected, re-running consent");
                    self.run_consent().await?
                }
                Err(e) => return Err(e),
            },
            None => self.run_consent().await?,
        };

        self.persist(&token)?;
        *stored = Some(token);
        Ok(())
    }

    /// Current access token, refreshed when close to expiry
    pub async fn access_token(&self) -> Result<UserToken> {
        let mut stored = self.stored.lock().await;

        if let Some(token) = stored.as_ref().filter(|t| t.is_fresh()) {
            return Ok(UserToken {
                access_token: token.access_token.clone(),
                expires_at: token.expires_at,
            });
        }

        let refresh_token = stored
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or_else(|| Error::Auth("no refresh token cached; re-run to authorize".into()))?;

        let token = self.refresh(&refresh_token).await?;
        self.persist(&token)?;

        let user_token = UserToken {
            access_token: token.access_token.clone(),
            expires_at: token.expires_at,
        };
        *stored = Some(token);
        Ok(user_token)
    }

    async fn run_consent(&self) -> Result<StoredToken> {
        let url = self.secret.authorization_url()?;
        let prompt = Arc::clone(&self.prompt);

        let reply = tokio::task::spawn_blocking(move || prompt.authorization_code(&url))
            .await
            .map_err(|e| Error::Auth(format!("consent prompt aborted: {e}")))??;

        let code = parse_authorization_reply(&reply)?;
        self.exchange_code(&code).await
    }

    /// Trade an authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<StoredToken> {
        tracing::debug!("Exchanging authorization code at {}", self.secret.token_uri);
        let form = [
            ("code", code),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("redirect_uri", self.secret.redirect_uri()),
            ("grant_type", "authorization_code"),
        ];
        let response = self.token_request(&form).await?;
        Ok(stored_from_response(response, None))
    }

    /// Use a refresh token to get a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        tracing::debug!("Refreshing user access token at {}", self.secret.token_uri);
        let form = [
            ("refresh_token", refresh_token),
            ("client_id", self.secret.client_id.as_str()),
            ("client_secret", self.secret.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self.token_request(&form).await?;
        Ok(stored_from_response(response, Some(refresh_token)))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http
            .inner()
            .post(&self.secret.token_uri)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("Token endpoint error: {} - {}", status, sanitize_for_log(&body));
            return Err(match serde_json::from_str::<TokenError>(&body) {
                Ok(err) => Error::OAuth {
                    error: err.error,
                    description: err.error_description,
                },
                Err(_) => Error::Auth(format!("token endpoint returned {status}")),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }

    fn persist(&self, token: &StoredToken) -> Result<()> {
        write_cache(&self.cache_path, token)?;
        tracing::debug!("Token cache written to {:?}", self.cache_path);
        Ok(())
    }
}

fn stored_from_response(response: TokenResponse, previous_refresh: Option<&str>) -> StoredToken {
    StoredToken {
        access_token: response.access_token,
        refresh_token: response
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_string)),
        expires_at: response
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        scope: response.scope,
    }
}

/// Read the cache. A missing or malformed file counts as empty.
pub fn read_cache(path: &Path) -> Option<StoredToken> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("Cannot read token cache {:?}: {}", path, e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(token) => Some(token),
        Err(e) => {
            tracing::warn!("Ignoring malformed token cache {:?}: {}", path, e);
            None
        }
    }
}

/// Write the cache, creating parent directories. Owner-only on unix.
pub fn write_cache(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(token)?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // `mode` only applies on create; tighten a pre-existing file too
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_JSON: &str = r#"{
        "installed": {
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "shh",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    #[test]
    fn test_parse_installed_secret() {
        let secret = ClientSecret::from_json(SECRET_JSON).unwrap();
        assert_eq!(secret.client_id, "123.apps.googleusercontent.com");
        assert_eq!(secret.redirect_uri(), "http://localhost");
    }

    #[test]
    fn test_parse_web_secret_with_defaults() {
        let secret =
            ClientSecret::from_json(r#"{"web": {"client_id": "id", "client_secret": "s"}}"#).unwrap();
        assert_eq!(secret.token_uri, "https://oauth2.googleapis.com/token");
        assert_eq!(secret.redirect_uri(), DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn test_authorization_url_carries_scope_and_offline_access() {
        let secret = ClientSecret::from_json(SECRET_JSON).unwrap();
        let url = secret.authorization_url().unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("scope".into(), BIGQUERY_SCOPE.into())));
        assert!(pairs.contains(&("access_type".into(), "offline".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
    }

    #[test]
    fn test_parse_authorization_reply() {
        assert_eq!(parse_authorization_reply("  4/abc \n").unwrap(), "4/abc");
        assert_eq!(
            parse_authorization_reply("http://localhost/?code=4%2Fxyz&scope=bq").unwrap(),
            "4/xyz"
        );
        assert!(matches!(
            parse_authorization_reply("http://localhost/?error=access_denied"),
            Err(Error::OAuth { ref error, .. }) if error == "access_denied"
        ));
        assert!(parse_authorization_reply("\n").is_err());
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let response = TokenResponse {
            access_token: "new".into(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: None,
        };
        let stored = stored_from_response(response, Some("old-refresh"));
        assert_eq!(stored.refresh_token.as_deref(), Some("old-refresh"));
        assert!(stored.is_fresh());
    }

    #[test]
    fn test_cache_round_trip_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        assert_eq!(read_cache(&path), None);

        let token = StoredToken {
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            expires_at: None,
            scope: None,
        };
        write_cache(&path, &token).unwrap();
        assert_eq!(read_cache(&path), Some(token));

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(read_cache(&path), None);
    }
}
