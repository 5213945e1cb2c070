use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Credential row as stored; `encrypted_value` never leaves the vault in
/// this form except to be decrypted there.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbCredential {
    pub id: i64,
    pub client_id: String,
    pub provider: String,
    pub credential_type: String,
    pub encrypted_value: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metric row as stored; `fields` is the canonical JSON object re-parsed on
/// read into the in-memory record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DbMetricRecord {
    pub id: i64,
    pub client_id: String,
    pub provider: String,
    pub metric_date: NaiveDate,
    pub dim_query: Option<String>,
    pub dim_page: Option<String>,
    pub dim_device: Option<String>,
    pub dim_location: Option<String>,
    pub fields: String,
    pub calculated_score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
