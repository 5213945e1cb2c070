use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use sqlx::Error as SqlxError;
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PulseError {
    /// No stored credential for this client/provider; the user must connect
    /// the provider before any fetch can run.
    #[error("no stored credential for client {client_id} and provider {provider}")]
    CredentialNotFound {
        client_id: String,
        provider: String,
    },

    /// Refresh token absent or rejected; only a new OAuth authorization fixes this.
    #[error("re-authentication required for provider {provider}")]
    ReauthenticationRequired { provider: String },

    /// The refresh exchange failed; the previously stored token pair is untouched.
    #[error("token refresh failed for provider {provider}: {reason}")]
    RefreshFailed { provider: String, reason: String },

    /// Provider rejected the access token (401/403) mid-fetch.
    #[error("provider {provider} rejected the access token (status {status})")]
    CredentialInvalid { provider: String, status: u16 },

    #[error("provider {provider} rate limited the request")]
    RateLimited {
        provider: String,
        retry_after: Duration,
    },

    /// Network failure, timeout, or non-auth upstream error status.
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// Rejected before any network or storage call.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("OAuth2 server error: {error}")]
    Oauth2Server { error: String },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] SqlxError),
}

/// Retry policies only restart operations that can plausibly succeed on a
/// second attempt. Auth and rate-limit failures are surfaced, never retried.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for PulseError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            PulseError::ProviderUnavailable { .. }
                | PulseError::Reqwest(_)
                | PulseError::Oauth2Token(_)
        )
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for PulseError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => PulseError::Oauth2Server {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(req_e) => {
                PulseError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => PulseError::Json(parse_err.into_inner()),
            RequestTokenError::Other(s) => PulseError::Oauth2Token(s),
        }
    }
}
