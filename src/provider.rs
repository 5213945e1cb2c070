use crate::error::PulseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four analytics providers the engine integrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    WebAnalytics,
    SearchConsole,
    BusinessListing,
    BehavioralAnalytics,
}

/// How normalized rows for a provider reach durable storage.
///
/// Search-console emits query/page/device breakdowns whose identical
/// re-fetches are not deduplicated by the source system, so its rows are
/// plain inserts; callers guard by fetching only new date ranges. Everything
/// else is one row per day and idempotently upserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    Upsert,
    Insert,
}

/// Per-provider strategy resolved once by `Provider::profile`, never by
/// runtime type inspection.
#[derive(Debug, Clone, Copy)]
pub struct ProviderProfile {
    pub write_policy: WritePolicy,
    /// Field whose first-half/second-half means drive trend classification.
    pub primary_trend_field: &'static str,
    /// Monotonic counters aggregated with a running maximum, not a sum.
    pub monotonic_fields: &'static [&'static str],
    pub dimensioned: bool,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::WebAnalytics,
        Provider::SearchConsole,
        Provider::BusinessListing,
        Provider::BehavioralAnalytics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::WebAnalytics => "web-analytics",
            Provider::SearchConsole => "search-console",
            Provider::BusinessListing => "business-listing",
            Provider::BehavioralAnalytics => "behavioral-analytics",
        }
    }

    pub fn profile(&self) -> ProviderProfile {
        match self {
            Provider::WebAnalytics => ProviderProfile {
                write_policy: WritePolicy::Upsert,
                primary_trend_field: "total_users",
                monotonic_fields: &[],
                dimensioned: false,
            },
            Provider::SearchConsole => ProviderProfile {
                write_policy: WritePolicy::Insert,
                primary_trend_field: "clicks",
                monotonic_fields: &[],
                dimensioned: true,
            },
            Provider::BusinessListing => ProviderProfile {
                write_policy: WritePolicy::Upsert,
                primary_trend_field: "total_views",
                monotonic_fields: &["total_reviews", "total_photos"],
                dimensioned: false,
            },
            Provider::BehavioralAnalytics => ProviderProfile {
                write_policy: WritePolicy::Upsert,
                primary_trend_field: "sessions",
                monotonic_fields: &[],
                dimensioned: false,
            },
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "web-analytics" => Ok(Provider::WebAnalytics),
            "search-console" => Ok(Provider::SearchConsole),
            "business-listing" => Ok(Provider::BusinessListing),
            "behavioral-analytics" => Ok(Provider::BehavioralAnalytics),
            other => Err(PulseError::Validation(format!(
                "unknown provider name: {other}"
            ))),
        }
    }
}
