use crate::error::{IsRetryable, PulseError};
use crate::provider::Provider;
use crate::providers::{ProviderAdapter, RawRows, check_status, retry_policy, transport_error};
use crate::types::{DateRange, Dimension};
use async_trait::async_trait;
use backon::Retryable;
use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// One day of listing performance. Review and photo counts are lifetime
/// totals as of that day, not daily deltas, which is why aggregation treats
/// them as monotonic counters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BusinessListingRow {
    pub date: NaiveDate,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub total_views: f64,
    #[serde(default)]
    pub search_views: f64,
    #[serde(default)]
    pub maps_views: f64,
    #[serde(default)]
    pub phone_calls: f64,
    #[serde(default)]
    pub website_clicks: f64,
    #[serde(default)]
    pub direction_requests: f64,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub total_reviews: f64,
    #[serde(default)]
    pub total_photos: f64,
    #[serde(default)]
    pub posts_created: f64,
}

#[derive(Debug, Deserialize)]
struct DailyMetricsResponse {
    #[serde(default)]
    days: Vec<BusinessListingRow>,
}

/// Adapter for the business-listing performance API: a windowed GET
/// returning ready-shaped daily rows, optionally split per location.
pub struct BusinessListingAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl BusinessListingAdapter {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl ProviderAdapter for BusinessListingAdapter {
    fn provider(&self) -> Provider {
        Provider::BusinessListing
    }

    async fn fetch(
        &self,
        access_token: &str,
        range: DateRange,
        _dimensions: Option<&[Dimension]>,
    ) -> Result<RawRows, PulseError> {
        let url = format!("{}/dailyMetrics", self.base_url);

        let resp = (|| async {
            let resp = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[
                    ("start_date", range.start.to_string()),
                    ("end_date", range.end.to_string()),
                ])
                .send()
                .await
                .map_err(|e| transport_error(self.provider(), e))?;
            check_status(self.provider(), resp)
        })
        .retry(retry_policy())
        .when(|e: &PulseError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(error = %err, "business-listing fetch retrying after {:?}", dur);
        })
        .await?;

        let payload: DailyMetricsResponse = resp
            .json()
            .await
            .map_err(|e| transport_error(self.provider(), e))?;
        Ok(RawRows::BusinessListing(payload.days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_default_to_zero() {
        let payload: DailyMetricsResponse = serde_json::from_value(json!({
            "days": [{"date": "2025-06-01", "total_views": 500.0, "phone_calls": 10.0}]
        }))
        .unwrap();

        let row = &payload.days[0];
        assert_eq!(row.total_views, 500.0);
        assert_eq!(row.phone_calls, 10.0);
        assert_eq!(row.website_clicks, 0.0);
        assert_eq!(row.average_rating, 0.0);
        assert!(row.location.is_none());
    }

    #[test]
    fn empty_window_is_zero_rows() {
        let payload: DailyMetricsResponse = serde_json::from_value(json!({})).unwrap();
        assert!(payload.days.is_empty());
    }
}
