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

/// One day of session-behavior telemetry. Friction counters (dead clicks,
/// rage clicks, quick backs) and JS errors are totals across sessions;
/// `bounce_rate` is a fraction in [0,1].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BehavioralRow {
    pub date: NaiveDate,
    #[serde(default)]
    pub sessions: f64,
    #[serde(default)]
    pub bounce_rate: f64,
    #[serde(default)]
    pub dead_clicks: f64,
    #[serde(default)]
    pub rage_clicks: f64,
    #[serde(default)]
    pub quick_backs: f64,
    #[serde(default)]
    pub js_errors: f64,
    #[serde(default)]
    pub avg_session_duration: f64,
}

#[derive(Debug, Deserialize)]
struct InsightsResponse {
    #[serde(default)]
    rows: Vec<BehavioralRow>,
}

/// Adapter for the behavioral-analytics export API.
pub struct BehavioralAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl BehavioralAdapter {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[async_trait]
impl ProviderAdapter for BehavioralAdapter {
    fn provider(&self) -> Provider {
        Provider::BehavioralAnalytics
    }

    async fn fetch(
        &self,
        access_token: &str,
        range: DateRange,
        _dimensions: Option<&[Dimension]>,
    ) -> Result<RawRows, PulseError> {
        let url = format!("{}/insights", self.base_url);

        let resp = (|| async {
            let resp = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[
                    ("from", range.start.to_string()),
                    ("to", range.end.to_string()),
                ])
                .send()
                .await
                .map_err(|e| transport_error(self.provider(), e))?;
            check_status(self.provider(), resp)
        })
        .retry(retry_policy())
        .when(|e: &PulseError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(error = %err, "behavioral-analytics fetch retrying after {:?}", dur);
        })
        .await?;

        let payload: InsightsResponse = resp
            .json()
            .await
            .map_err(|e| transport_error(self.provider(), e))?;
        Ok(RawRows::Behavioral(payload.rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_counters_default_to_zero() {
        let payload: InsightsResponse = serde_json::from_value(json!({
            "rows": [{"date": "2025-06-01", "sessions": 220.0, "bounce_rate": 0.41}]
        }))
        .unwrap();

        let row = &payload.rows[0];
        assert_eq!(row.sessions, 220.0);
        assert_eq!(row.bounce_rate, 0.41);
        assert_eq!(row.rage_clicks, 0.0);
        assert_eq!(row.js_errors, 0.0);
    }
}
