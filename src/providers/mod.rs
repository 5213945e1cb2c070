//! Provider adapters: one per upstream analytics service, each translating
//! the canonical (token, date range, dimensions) request into the provider's
//! own query shape and back into raw rows.

pub mod behavioral;
pub mod business_listing;
pub mod search_console;
pub mod web_analytics;

use crate::config::Config;
use crate::error::PulseError;
use crate::provider::Provider;
use crate::types::{DateRange, Dimension};
use async_trait::async_trait;
use backon::ExponentialBuilder;
use std::time::Duration;

pub use behavioral::{BehavioralAdapter, BehavioralRow};
pub use business_listing::{BusinessListingAdapter, BusinessListingRow};
pub use search_console::{SearchConsoleAdapter, SearchConsoleRow};
pub use web_analytics::{WebAnalyticsAdapter, WebAnalyticsRow};

/// Raw provider payloads, tagged by source. Zero rows is a valid result.
#[derive(Debug, Clone)]
pub enum RawRows {
    WebAnalytics(Vec<WebAnalyticsRow>),
    SearchConsole(Vec<SearchConsoleRow>),
    BusinessListing(Vec<BusinessListingRow>),
    Behavioral(Vec<BehavioralRow>),
}

impl RawRows {
    pub fn len(&self) -> usize {
        match self {
            RawRows::WebAnalytics(rows) => rows.len(),
            RawRows::SearchConsole(rows) => rows.len(),
            RawRows::BusinessListing(rows) => rows.len(),
            RawRows::Behavioral(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn fetch(
        &self,
        access_token: &str,
        range: DateRange,
        dimensions: Option<&[Dimension]>,
    ) -> Result<RawRows, PulseError>;
}

/// Shared HTTP client for provider fetches: seconds-scale timeouts distinct
/// from the process lifetime, optional egress proxy.
pub fn build_http_client(cfg: &Config) -> Result<reqwest::Client, PulseError> {
    let mut builder = reqwest::Client::builder()
        .user_agent("clientpulse/0.3")
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .timeout(Duration::from_secs(cfg.request_timeout_secs))
        .http2_adaptive_window(true);
    if let Some(proxy_url) = cfg.proxy.clone() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }
    Ok(builder.build()?)
}

pub(crate) fn retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Map upstream status codes onto the error taxonomy: 401/403 invalidates
/// the credential (re-auth upstream, no retry), 429 carries a backoff hint,
/// anything else non-2xx is a retryable outage.
pub(crate) fn check_status(
    provider: Provider,
    resp: reqwest::Response,
) -> Result<reqwest::Response, PulseError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status.as_u16() {
        401 | 403 => Err(PulseError::CredentialInvalid {
            provider: provider.to_string(),
            status: status.as_u16(),
        }),
        429 => Err(PulseError::RateLimited {
            provider: provider.to_string(),
            retry_after: retry_after_hint(&resp),
        }),
        _ => Err(PulseError::ProviderUnavailable {
            provider: provider.to_string(),
            reason: format!("upstream status {status}"),
        }),
    }
}

fn retry_after_hint(resp: &reqwest::Response) -> Duration {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(60))
}

/// Transport-level failures (timeouts, connect errors) are outages, not
/// caller crashes.
pub(crate) fn transport_error(provider: Provider, e: reqwest::Error) -> PulseError {
    PulseError::ProviderUnavailable {
        provider: provider.to_string(),
        reason: if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        },
    }
}
