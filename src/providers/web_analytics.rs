use crate::error::{IsRetryable, PulseError};
use crate::provider::Provider;
use crate::providers::{ProviderAdapter, RawRows, check_status, retry_policy, transport_error};
use crate::types::{DateRange, Dimension};
use async_trait::async_trait;
use backon::Retryable;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::warn;

/// Metric names requested from the reporting API, in response order.
const METRIC_NAMES: [&str; 8] = [
    "totalUsers",
    "newUsers",
    "sessions",
    "engagementRate",
    "bounceRate",
    "conversions",
    "screenPageViewsPerSession",
    "averageSessionDuration",
];

#[derive(Debug, Clone, PartialEq)]
pub struct WebAnalyticsRow {
    pub date: NaiveDate,
    pub total_users: f64,
    pub new_users: f64,
    pub sessions: f64,
    pub engagement_rate: f64,
    pub bounce_rate: f64,
    pub conversions: f64,
    pub pages_per_session: f64,
    pub avg_session_duration: f64,
}

#[derive(Debug, Deserialize)]
struct RunReportResponse {
    #[serde(default)]
    rows: Vec<ReportRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRow {
    #[serde(default)]
    dimension_values: Vec<ReportValue>,
    #[serde(default)]
    metric_values: Vec<ReportValue>,
}

#[derive(Debug, Deserialize, Default)]
struct ReportValue {
    #[serde(default)]
    value: String,
}

/// Adapter for the web-analytics reporting API (GA4-style runReport: one
/// date dimension, a fixed metric list, stringly-typed cell values).
pub struct WebAnalyticsAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl WebAnalyticsAdapter {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    fn request_body(range: DateRange) -> Value {
        json!({
            "dateRanges": [{
                "startDate": range.start.to_string(),
                "endDate": range.end.to_string(),
            }],
            "dimensions": [{"name": "date"}],
            "metrics": METRIC_NAMES.iter().map(|m| json!({"name": m})).collect::<Vec<_>>(),
        })
    }

    fn parse_row(row: &ReportRow) -> Option<WebAnalyticsRow> {
        let raw_date = row.dimension_values.first().map(|v| v.value.as_str())?;
        // Reporting dates arrive as yyyymmdd.
        let date = NaiveDate::parse_from_str(raw_date, "%Y%m%d")
            .inspect_err(|e| warn!(raw_date, error = %e, "skipping row with unparseable date"))
            .ok()?;
        let metric = |i: usize| -> f64 {
            row.metric_values
                .get(i)
                .and_then(|v| v.value.parse::<f64>().ok())
                .unwrap_or(0.0)
        };
        Some(WebAnalyticsRow {
            date,
            total_users: metric(0),
            new_users: metric(1),
            sessions: metric(2),
            engagement_rate: metric(3),
            bounce_rate: metric(4),
            conversions: metric(5),
            pages_per_session: metric(6),
            avg_session_duration: metric(7),
        })
    }
}

#[async_trait]
impl ProviderAdapter for WebAnalyticsAdapter {
    fn provider(&self) -> Provider {
        Provider::WebAnalytics
    }

    async fn fetch(
        &self,
        access_token: &str,
        range: DateRange,
        _dimensions: Option<&[Dimension]>,
    ) -> Result<RawRows, PulseError> {
        let url = format!("{}/reports:run", self.base_url);
        let body = Self::request_body(range);

        let resp = (|| async {
            let resp = self
                .http
                .post(&url)
                .bearer_auth(access_token)
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_error(self.provider(), e))?;
            check_status(self.provider(), resp)
        })
        .retry(retry_policy())
        .when(|e: &PulseError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(error = %err, "web-analytics fetch retrying after {:?}", dur);
        })
        .await?;

        let payload: RunReportResponse = resp
            .json()
            .await
            .map_err(|e| transport_error(self.provider(), e))?;
        let rows = payload.rows.iter().filter_map(Self::parse_row).collect();
        Ok(RawRows::WebAnalytics(rows))
    }
}
