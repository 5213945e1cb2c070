use crate::provider::Provider;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Breakdown axes attached to a record. All `None` for providers that emit a
/// single row per day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub query: Option<String>,
    pub page: Option<String>,
    pub device: Option<String>,
    pub location: Option<String>,
}

impl Dimensions {
    pub fn is_empty(&self) -> bool {
        self.query.is_none()
            && self.page.is_none()
            && self.device.is_none()
            && self.location.is_none()
    }
}

/// Canonical normalized metric record, one per date (plus dimension tuple
/// for dimensioned providers).
///
/// `fields` maps canonical field names to numbers; missing provider values
/// are written as 0.0 during normalization so downstream arithmetic is
/// total-safe. `calculated_score` is always recomputed from `fields` right
/// before persisting, never carried along independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub client_id: String,
    pub provider: Provider,
    pub date: NaiveDate,
    pub dimensions: Dimensions,
    pub fields: BTreeMap<String, f64>,
    pub calculated_score: i64,
}

impl MetricRecord {
    pub fn field(&self, name: &str) -> f64 {
        self.fields.get(name).copied().unwrap_or(0.0)
    }
}

/// Convenience for building the canonical field map from literal pairs.
pub fn field_map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}
