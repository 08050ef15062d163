//! Error types
//!
//! Every fallible operation in the library returns [`Result`]. The binary
//! wraps these in `anyhow` for display.

use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A service-account key was found but this build cannot sign JWT assertions.
    #[error(
        "service-account key file found, but this build has no signing support; \
         rebuild with the `service-account` feature"
    )]
    MissingCryptoSupport,
    #[error("no credentials configured: set a key file, an OAuth client secret, or application default credentials")]
    NoCredentials,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("OAuth error `{error}`{}", .description.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
    OAuth {
        error: String,
        description: Option<String>,
    },
    #[error("API request failed ({status}){}: {message}", .reason.as_deref().map(|r| format!(" [{r}]")).unwrap_or_default())]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },
    #[error("job {job_id} failed{}: {message}", .reason.as_deref().map(|r| format!(" [{r}]")).unwrap_or_default())]
    JobFailed {
        job_id: String,
        reason: Option<String>,
        message: String,
    },
    #[error("gave up waiting for {what} after {waited:?}")]
    PollTimeout { what: String, waited: Duration },
    #[error("{kind} `{id}` was created but is missing from the listing")]
    NotListed { kind: &'static str, id: String },
    #[error("dataset `{0}` is still readable after deletion")]
    DeletedDatasetStillPresent(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[cfg(feature = "service-account")]
    #[error(transparent)]
    GcpAuth(#[from] gcp_auth::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl Error {
    /// True for an HTTP 404 from the API.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_only_for_404() {
        let not_found = Error::Api {
            status: 404,
            reason: Some("notFound".into()),
            message: "Not found: Dataset p:d".into(),
        };
        assert!(not_found.is_not_found());
        assert_eq!(not_found.status(), Some(404));

        let forbidden = Error::Api {
            status: 403,
            reason: None,
            message: "denied".into(),
        };
        assert!(!forbidden.is_not_found());
        assert!(!Error::NoCredentials.is_not_found());
    }

    #[test]
    fn test_display_includes_reason() {
        let err = Error::JobFailed {
            job_id: "job_1".into(),
            reason: Some("invalid".into()),
            message: "bad row".into(),
        };
        assert_eq!(err.to_string(), "job job_1 failed [invalid]: bad row");

        let err = Error::OAuth {
            error: "invalid_grant".into(),
            description: None,
        };
        assert_eq!(err.to_string(), "OAuth error `invalid_grant`");
    }
}
