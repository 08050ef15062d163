//! HTTP utilities for GCP REST API calls

use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Google API error envelope: `{"error": {"code", "message", "errors": [{"reason"}]}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

/// Build an [`Error::Api`] from a non-success response body
pub(crate) fn api_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => Error::Api {
            status,
            reason: envelope
                .error
                .errors
                .into_iter()
                .find_map(|e| e.reason)
                .or(envelope.error.status),
            message: envelope.error.message,
        },
        Err(_) => Error::Api {
            status,
            reason: None,
            message: sanitize_for_log(body),
        },
    }
}

/// Unauthenticated HTTP transport for GCP API calls. Wrap it with
/// [`Credentials::authorize`](super::auth::Credentials::authorize) to sign requests.
#[derive(Clone)]
pub struct GcpHttpClient {
    client: Client,
}

impl std::fmt::Debug for GcpHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpHttpClient").finish_non_exhaustive()
    }
}

impl GcpHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("bqtour/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    pub(crate) fn inner(&self) -> &Client {
        &self.client
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        tracing::debug!("GET {}", url);
        self.execute(self.client.get(url).bearer_auth(token).query(query))
            .await
    }

    /// Make a POST request with an optional JSON body
    pub async fn post<B, T>(&self, url: &str, token: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("POST {}", url);

        let mut request = self.client.post(url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        self.execute(request).await
    }

    /// Make a PATCH request (partial update)
    pub async fn patch<B, T>(&self, url: &str, token: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("PATCH {}", url);
        self.execute(self.client.patch(url).bearer_auth(token).json(body))
            .await
    }

    /// Make a PUT request (full replace)
    pub async fn put<B, T>(&self, url: &str, token: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("PUT {}", url);
        self.execute(self.client.put(url).bearer_auth(token).json(body))
            .await
    }

    /// Make a DELETE request. The API answers with an empty body on success.
    pub async fn delete(&self, url: &str, token: &str) -> Result<()> {
        tracing::debug!("DELETE {}", url);

        let response = self.client.delete(url).bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(())
    }

    /// POST a `multipart/related` upload: JSON metadata followed by raw media bytes
    pub async fn post_multipart<B, T>(
        &self,
        url: &str,
        token: &str,
        metadata: &B,
        media: &[u8],
        media_type: &str,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!("POST (multipart, {} bytes) {}", media.len(), url);

        let boundary = format!("bqtour_{}", uuid::Uuid::new_v4().simple());
        let body = multipart_related_body(&boundary, &serde_json::to_vec(metadata)?, media, media_type);

        let request = self
            .client
            .post(url)
            .bearer_auth(token)
            .query(&[("uploadType", "multipart")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body);

        self.execute(request).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(api_error(status.as_u16(), &body));
        }

        // Empty bodies decode as `null` so callers can ask for `()` or `Option<_>`
        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        Ok(serde_json::from_str(body)?)
    }
}

/// Assemble a two-part `multipart/related` body
pub(crate) fn multipart_related_body(
    boundary: &str,
    metadata: &[u8],
    media: &[u8],
    media_type: &str,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + media.len() + 256);

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {media_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    body
}

/// Format a GCP API error for display
/// Security: Sanitizes error messages to avoid leaking sensitive API details
pub fn format_gcp_error(error: &Error) -> String {
    match error.status() {
        Some(401) => {
            return "Authentication failed. Check the key file or delete the token cache and re-authorize."
                .to_string()
        }
        Some(403) => return "Permission denied. Check your BigQuery IAM permissions.".to_string(),
        Some(404) => return "Resource not found.".to_string(),
        Some(409) => {
            return "Resource conflict. The resource may already exist or be in use.".to_string()
        }
        Some(429) => return "Rate limit exceeded. Please try again later.".to_string(),
        Some(500) | Some(503) => {
            return "BigQuery service temporarily unavailable. Please try again.".to_string()
        }
        _ => {}
    }

    // Truncate long error messages and remove potential sensitive data
    let error_str = error.to_string();
    let sanitized = error_str
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .take(120)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
