use crate::error::{IsRetryable, PulseError};
use crate::provider::Provider;
use crate::providers::{ProviderAdapter, RawRows, check_status, retry_policy, transport_error};
use crate::types::{DateRange, Dimension};
use async_trait::async_trait;
use backon::Retryable;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConsoleRow {
    pub date: NaiveDate,
    pub query: Option<String>,
    pub page: Option<String>,
    pub device: Option<String>,
    pub impressions: f64,
    pub clicks: f64,
    pub ctr: f64,
    pub position: f64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<ApiRow>,
}

#[derive(Debug, Deserialize)]
struct ApiRow {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    clicks: f64,
    #[serde(default)]
    impressions: f64,
    #[serde(default)]
    ctr: f64,
    #[serde(default)]
    position: f64,
}

/// Adapter for the search-console analytics API. Dimension keys come back
/// positionally in the order they were requested, date always first. One raw
/// row per unique (date, dimension tuple).
pub struct SearchConsoleAdapter {
    http: reqwest::Client,
    base_url: String,
}

impl SearchConsoleAdapter {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Date plus whichever breakdown axes the caller asked for; location is
    /// not a search-console axis and is ignored.
    fn dimension_names(dimensions: Option<&[Dimension]>) -> Vec<&'static str> {
        let mut names = vec!["date"];
        for dim in dimensions.unwrap_or_default() {
            match dim {
                Dimension::Query => names.push("query"),
                Dimension::Page => names.push("page"),
                Dimension::Device => names.push("device"),
                Dimension::Location => {}
            }
        }
        names
    }

    fn parse_row(names: &[&str], row: &ApiRow) -> Option<SearchConsoleRow> {
        let mut parsed = SearchConsoleRow {
            date: NaiveDate::default(),
            query: None,
            page: None,
            device: None,
            impressions: row.impressions,
            clicks: row.clicks,
            ctr: row.ctr,
            position: row.position,
        };
        let mut saw_date = false;
        for (name, key) in names.iter().zip(row.keys.iter()) {
            match *name {
                "date" => {
                    parsed.date = key
                        .parse::<NaiveDate>()
                        .inspect_err(
                            |e| warn!(raw_date = %key, error = %e, "skipping row with unparseable date"),
                        )
                        .ok()?;
                    saw_date = true;
                }
                "query" => parsed.query = Some(key.clone()),
                "page" => parsed.page = Some(key.clone()),
                "device" => parsed.device = Some(key.clone()),
                _ => {}
            }
        }
        saw_date.then_some(parsed)
    }
}

#[async_trait]
impl ProviderAdapter for SearchConsoleAdapter {
    fn provider(&self) -> Provider {
        Provider::SearchConsole
    }

    async fn fetch(
        &self,
        access_token: &str,
        range: DateRange,
        dimensions: Option<&[Dimension]>,
    ) -> Result<RawRows, PulseError> {
        let url = format!("{}/searchAnalytics/query", self.base_url);
        let names = Self::dimension_names(dimensions);
        let body = json!({
            "startDate": range.start.to_string(),
            "endDate": range.end.to_string(),
            "dimensions": &names,
        });

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
            warn!(error = %err, "search-console fetch retrying after {:?}", dur);
        })
        .await?;

        let payload: QueryResponse = resp
            .json()
            .await
            .map_err(|e| transport_error(self.provider(), e))?;
        let rows = payload
            .rows
            .iter()
            .filter_map(|row| Self::parse_row(&names, row))
            .collect();
        Ok(RawRows::SearchConsole(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_positionally_onto_requested_dimensions() {
        let names = SearchConsoleAdapter::dimension_names(Some(&[
            Dimension::Query,
            Dimension::Device,
        ]));
        assert_eq!(names, vec!["date", "query", "device"]);

        let row = ApiRow {
            keys: vec![
                "2025-06-01".to_string(),
                "dentist near me".to_string(),
                "MOBILE".to_string(),
            ],
            clicks: 12.0,
            impressions: 340.0,
            ctr: 0.035,
            position: 4.2,
        };
        let parsed = SearchConsoleAdapter::parse_row(&names, &row).unwrap();
        assert_eq!(parsed.query.as_deref(), Some("dentist near me"));
        assert_eq!(parsed.device.as_deref(), Some("MOBILE"));
        assert!(parsed.page.is_none());
        assert_eq!(parsed.position, 4.2);
    }

    #[test]
    fn row_without_date_key_is_skipped() {
        let names = vec!["date"];
        let row = ApiRow {
            keys: vec![],
            clicks: 1.0,
            impressions: 1.0,
            ctr: 1.0,
            position: 1.0,
        };
        assert!(SearchConsoleAdapter::parse_row(&names, &row).is_none());
    }

    #[test]
    fn missing_numeric_fields_deserialize_to_zero() {
        let payload: QueryResponse =
            serde_json::from_value(json!({"rows": [{"keys": ["2025-06-01"]}]})).unwrap();
        assert_eq!(payload.rows[0].clicks, 0.0);
        assert_eq!(payload.rows[0].position, 0.0);
    }
}
