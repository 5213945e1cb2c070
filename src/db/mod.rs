//! Database module: models, schema, and the sqlite-backed storage layer.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `store.rs`: credential and metric-record persistence

pub mod models;
pub mod schema;
pub mod store;

use crate::error::PulseError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

pub use models::{DbCredential, DbMetricRecord};
pub use schema::SQLITE_INIT;
pub use store::{PersistReport, SqlitePool, Storage};

/// Open (creating if missing) the database and run the bundled DDL.
pub async fn connect(database_url: &str) -> Result<Storage, PulseError> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let mut opts = SqlitePoolOptions::new();
    if database_url.contains(":memory:") {
        // Every pooled connection to :memory: would see its own database;
        // pin a single long-lived connection instead.
        opts = opts
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }
    let pool = opts.connect_with(connect_opts).await?;
    let storage = Storage::new(pool);
    storage.init_schema().await?;
    Ok(storage)
}
