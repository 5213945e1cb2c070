//! SQL DDL for the engine's durable tables.
//! SQLite-first design; can be adapted for other RDBMS.

/// Schema notes:
/// - `credentials` holds one row per (client, provider, credential_type);
///   `encrypted_value` is always ciphertext, never a bare token.
/// - `metric_records` stores canonical numeric fields as a JSON object in
///   `fields`; the dimension columns are NULL for single-row-per-day
///   providers and populated for query/page/device/location breakdowns.
/// - No UNIQUE constraint on metric_records: upsert-vs-insert is a
///   per-provider policy enforced by the store, and search-console rows
///   must be able to duplicate on re-fetch.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    credential_type TEXT NOT NULL, -- 'access' | 'refresh'
    encrypted_value TEXT NOT NULL,
    expires_at TEXT NULL, -- RFC3339, NULL for refresh tokens
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(client_id, provider, credential_type)
);

CREATE TABLE IF NOT EXISTS metric_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    metric_date TEXT NOT NULL, -- ISO-8601 date
    dim_query TEXT NULL,
    dim_page TEXT NULL,
    dim_device TEXT NULL,
    dim_location TEXT NULL,
    fields TEXT NOT NULL, -- JSON object, canonical field name -> number
    calculated_score INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metric_records_key
    ON metric_records(client_id, provider, metric_date);
"#;
