use crate::db::models::{DbCredential, DbMetricRecord};
use crate::db::schema::SQLITE_INIT;
use crate::error::PulseError;
use crate::metrics::record::{Dimensions, MetricRecord};
use crate::provider::{Provider, WritePolicy};
use crate::types::DateRange;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

pub type SqlitePool = Pool<Sqlite>;

/// Outcome of a batch persist. Partial failures are reported row-by-row so
/// callers can re-submit only the failed subset; nothing here retries.
#[derive(Debug, Default)]
pub struct PersistReport {
    pub stored: usize,
    pub failed: Vec<(usize, PulseError)>,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), PulseError> {
        // execute multiple statements safely (SQLite supports multi-commands but sqlx::query doesn't)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    // ---- credentials ----

    /// Replace the credential pair for (client, provider) in one transaction.
    /// Delete-then-insert: stale rows never coexist with fresh ones, and a
    /// failed insert rolls the delete back.
    pub async fn replace_credentials(
        &self,
        client_id: &str,
        provider: Provider,
        access_ciphertext: &str,
        expires_at: Option<DateTime<Utc>>,
        refresh_ciphertext: Option<&str>,
    ) -> Result<(), PulseError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM credentials WHERE client_id = ? AND provider = ?")
            .bind(client_id)
            .bind(provider.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"INSERT INTO credentials
               (client_id, provider, credential_type, encrypted_value, expires_at, created_at, updated_at)
               VALUES (?, ?, 'access', ?, ?, ?, ?)"#,
        )
        .bind(client_id)
        .bind(provider.as_str())
        .bind(access_ciphertext)
        .bind(expires_at.map(|t| t.to_rfc3339()))
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if let Some(refresh) = refresh_ciphertext {
            sqlx::query(
                r#"INSERT INTO credentials
                   (client_id, provider, credential_type, encrypted_value, expires_at, created_at, updated_at)
                   VALUES (?, ?, 'refresh', ?, NULL, ?, ?)"#,
            )
            .bind(client_id)
            .bind(provider.as_str())
            .bind(refresh)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Fetch the stored rows for (client, provider): zero, one (access only)
    /// or two (access + refresh).
    pub async fn credential_pair(
        &self,
        client_id: &str,
        provider: Provider,
    ) -> Result<Vec<DbCredential>, PulseError> {
        let rows = sqlx::query(
            r#"SELECT id, client_id, provider, credential_type, encrypted_value,
               expires_at, created_at, updated_at
               FROM credentials
               WHERE client_id = ? AND provider = ?
               ORDER BY credential_type"#,
        )
        .bind(client_id)
        .bind(provider.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::credential_from_row).collect()
    }

    // ---- metric records ----

    /// Persist a batch under the provider's write policy. Rows are written
    /// one by one; a failing row is recorded and the rest proceed.
    pub async fn persist(&self, records: &[MetricRecord], policy: WritePolicy) -> PersistReport {
        let mut report = PersistReport::default();
        for (idx, record) in records.iter().enumerate() {
            let result = match policy {
                WritePolicy::Upsert => self.upsert_record(record).await,
                WritePolicy::Insert => self.insert_record(record).await,
            };
            match result {
                Ok(()) => report.stored += 1,
                Err(e) => report.failed.push((idx, e)),
            }
        }
        report
    }

    /// Upsert keyed on (client_id, provider, metric_date): update the day's
    /// row in place, insert when no row matched. Repeated identical fetches
    /// leave the row count unchanged.
    async fn upsert_record(&self, record: &MetricRecord) -> Result<(), PulseError> {
        let fields_json = serde_json::to_string(&record.fields)?;
        let now = Utc::now().to_rfc3339();

        let updated = sqlx::query(
            r#"UPDATE metric_records SET
                dim_query = ?, dim_page = ?, dim_device = ?, dim_location = ?,
                fields = ?, calculated_score = ?, updated_at = ?
               WHERE client_id = ? AND provider = ? AND metric_date = ?"#,
        )
        .bind(&record.dimensions.query)
        .bind(&record.dimensions.page)
        .bind(&record.dimensions.device)
        .bind(&record.dimensions.location)
        .bind(&fields_json)
        .bind(record.calculated_score)
        .bind(&now)
        .bind(&record.client_id)
        .bind(record.provider.as_str())
        .bind(record.date.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            self.insert_record(record).await?;
        }
        Ok(())
    }

    async fn insert_record(&self, record: &MetricRecord) -> Result<(), PulseError> {
        let fields_json = serde_json::to_string(&record.fields)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO metric_records
               (client_id, provider, metric_date, dim_query, dim_page, dim_device,
                dim_location, fields, calculated_score, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&record.client_id)
        .bind(record.provider.as_str())
        .bind(record.date.to_string())
        .bind(&record.dimensions.query)
        .bind(&record.dimensions.page)
        .bind(&record.dimensions.device)
        .bind(&record.dimensions.location)
        .bind(&fields_json)
        .bind(record.calculated_score)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Range read for aggregation, ordered by date ascending.
    pub async fn records_in_range(
        &self,
        client_id: &str,
        provider: Provider,
        range: DateRange,
    ) -> Result<Vec<MetricRecord>, PulseError> {
        let rows = sqlx::query(
            r#"SELECT id, client_id, provider, metric_date, dim_query, dim_page,
               dim_device, dim_location, fields, calculated_score, created_at, updated_at
               FROM metric_records
               WHERE client_id = ? AND provider = ? AND metric_date >= ? AND metric_date <= ?
               ORDER BY metric_date ASC"#,
        )
        .bind(client_id)
        .bind(provider.as_str())
        .bind(range.start.to_string())
        .bind(range.end.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Self::metric_from_row(row).and_then(MetricRecord::try_from))
            .collect()
    }

    fn credential_from_row(row: SqliteRow) -> Result<DbCredential, PulseError> {
        let expires_at_raw: Option<String> = row.try_get("expires_at")?;
        let expires_at = expires_at_raw
            .map(|s| parse_rfc3339(&s))
            .transpose()?;
        Ok(DbCredential {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            provider: row.try_get("provider")?,
            credential_type: row.try_get("credential_type")?,
            encrypted_value: row.try_get("encrypted_value")?,
            expires_at,
            created_at: parse_rfc3339(&row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_rfc3339(&row.try_get::<String, _>("updated_at")?)?,
        })
    }

    fn metric_from_row(row: SqliteRow) -> Result<DbMetricRecord, PulseError> {
        let date_raw: String = row.try_get("metric_date")?;
        let metric_date = NaiveDate::from_str(&date_raw)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(DbMetricRecord {
            id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            provider: row.try_get("provider")?,
            metric_date,
            dim_query: row.try_get("dim_query")?,
            dim_page: row.try_get("dim_page")?,
            dim_device: row.try_get("dim_device")?,
            dim_location: row.try_get("dim_location")?,
            fields: row.try_get("fields")?,
            calculated_score: row.try_get("calculated_score")?,
            created_at: parse_rfc3339(&row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_rfc3339(&row.try_get::<String, _>("updated_at")?)?,
        })
    }
}

impl TryFrom<DbMetricRecord> for MetricRecord {
    type Error = PulseError;

    /// Rows we wrote ourselves always carry a known provider tag and a JSON
    /// object in `fields`; a row that fails either decode is corrupt and
    /// surfaces as an error rather than a mislabeled record.
    fn try_from(row: DbMetricRecord) -> Result<Self, PulseError> {
        let provider = row.provider.parse::<Provider>()?;
        let fields = serde_json::from_str(&row.fields)?;
        Ok(MetricRecord {
            client_id: row.client_id,
            provider,
            date: row.metric_date,
            dimensions: Dimensions {
                query: row.dim_query,
                page: row.dim_page,
                device: row.dim_device,
                location: row.dim_location,
            },
            fields,
            calculated_score: row.calculated_score,
        })
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, PulseError> {
    Ok(chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn corrupted_fields_blob_surfaces_as_a_decode_error() {
        let storage = db::connect("sqlite::memory:").await.unwrap();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO metric_records
               (client_id, provider, metric_date, fields, calculated_score, created_at, updated_at)
               VALUES ('c1', 'web-analytics', '2025-06-01', 'not-json', 50, ?, ?)"#,
        )
        .bind(&now)
        .bind(&now)
        .execute(storage.pool())
        .await
        .unwrap();

        let range = DateRange::new(d("2025-06-01"), d("2025-06-30")).unwrap();
        let err = storage
            .records_in_range("c1", Provider::WebAnalytics, range)
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::Json(_)));
    }

    #[test]
    fn unknown_provider_tag_fails_conversion() {
        let row = DbMetricRecord {
            id: 1,
            client_id: "c1".to_string(),
            provider: "social-media".to_string(),
            metric_date: d("2025-06-01"),
            dim_query: None,
            dim_page: None,
            dim_device: None,
            dim_location: None,
            fields: "{}".to_string(),
            calculated_score: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let err = MetricRecord::try_from(row).unwrap_err();
        assert!(matches!(err, PulseError::Validation(_)));
    }
}
