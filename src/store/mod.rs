//! Persistent store: pool setup, schema, and per-table repositories.
//!
//! The concrete backend is chosen once, when the pool is built; everything
//! above this module talks to [`Store`] and never branches on the dialect.

pub mod channels;
pub mod ledger;
pub mod runs;
pub mod settings;

pub use channels::{Channel, ChannelRepository, NewChannel};
pub use ledger::ProcessedRepository;
pub use runs::{RunCounters, RunRecord, RunRepository, RunStatus};
pub use settings::SettingsRepository;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

#[cfg(feature = "postgres")]
pub type DbPool = sqlx::PgPool;
#[cfg(not(feature = "postgres"))]
pub type DbPool = sqlx::SqlitePool;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(not(feature = "postgres"))]
const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS channels (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    handle        TEXT NOT NULL UNIQUE,
    title         TEXT NOT NULL DEFAULT '',
    priority      INTEGER NOT NULL DEFAULT 5,
    is_active     BOOLEAN NOT NULL DEFAULT 1,
    last_item_id  INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS processed_items (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id    INTEGER NOT NULL REFERENCES channels(id),
    item_id       INTEGER NOT NULL,
    raw_text      TEXT NOT NULL DEFAULT '',
    summary       TEXT NOT NULL DEFAULT '',
    processed_at  TEXT NOT NULL,
    UNIQUE(channel_id, item_id)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS settings (
    key          TEXT PRIMARY KEY,
    value        TEXT NOT NULL,
    description  TEXT
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS run_records (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at         TEXT NOT NULL,
    completed_at       TEXT,
    status             TEXT NOT NULL DEFAULT 'started',
    sources_processed  INTEGER NOT NULL DEFAULT 0,
    items_collected    INTEGER NOT NULL DEFAULT 0,
    items_published    INTEGER NOT NULL DEFAULT 0,
    error_message      TEXT
);
"#,
];

#[cfg(feature = "postgres")]
const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS channels (
    id            BIGSERIAL PRIMARY KEY,
    handle        TEXT NOT NULL UNIQUE,
    title         TEXT NOT NULL DEFAULT '',
    priority      BIGINT NOT NULL DEFAULT 5,
    is_active     BOOLEAN NOT NULL DEFAULT TRUE,
    last_item_id  BIGINT NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS processed_items (
    id            BIGSERIAL PRIMARY KEY,
    channel_id    BIGINT NOT NULL REFERENCES channels(id),
    item_id       BIGINT NOT NULL,
    raw_text      TEXT NOT NULL DEFAULT '',
    summary       TEXT NOT NULL DEFAULT '',
    processed_at  TEXT NOT NULL,
    UNIQUE(channel_id, item_id)
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS settings (
    key          TEXT PRIMARY KEY,
    value        TEXT NOT NULL,
    description  TEXT
);
"#,
    r#"
CREATE TABLE IF NOT EXISTS run_records (
    id                 BIGSERIAL PRIMARY KEY,
    started_at         TEXT NOT NULL,
    completed_at       TEXT,
    status             TEXT NOT NULL DEFAULT 'started',
    sources_processed  BIGINT NOT NULL DEFAULT 0,
    items_collected    BIGINT NOT NULL DEFAULT 0,
    items_published    BIGINT NOT NULL DEFAULT 0,
    error_message      TEXT
);
"#,
];

/// Handle to the shared pool. Cheap to clone; repositories borrow it.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    #[cfg(not(feature = "postgres"))]
    pub async fn connect(url: &str) -> StoreResult<Self> {
        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
        use std::str::FromStr;

        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    #[cfg(feature = "postgres")]
    pub async fn connect(url: &str) -> StoreResult<Self> {
        use sqlx::postgres::PgPoolOptions;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    /// In-memory database, migrated and ready. A single connection keeps
    /// every query on the same database.
    #[cfg(not(feature = "postgres"))]
    pub async fn open_in_memory() -> StoreResult<Self> {
        use sqlx::sqlite::SqlitePoolOptions;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Create missing tables and seed default settings rows.
    pub async fn migrate(&self) -> StoreResult<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        self.settings().seed_defaults().await
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn channels(&self) -> ChannelRepository<'_> {
        ChannelRepository::new(&self.pool)
    }

    pub fn ledger(&self) -> ProcessedRepository<'_> {
        ProcessedRepository::new(&self.pool)
    }

    pub fn runs(&self) -> RunRepository<'_> {
        RunRepository::new(&self.pool)
    }

    pub fn settings(&self) -> SettingsRepository<'_> {
        SettingsRepository::new(&self.pool)
    }
}

/// Render a timestamp the way every table stores it. A fixed precision keeps
/// the stored strings lexicographically ordered, which `run_records` relies
/// on when comparing against a cutoff.
pub(crate) fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored datetime string to DateTime<Utc>.
pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_repeatable() {
        let store = Store::open_in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }

    #[test]
    fn parse_datetime_accepts_both_formats() {
        assert!(parse_datetime("2026-08-22T07:00:00.000000Z").is_some());
        assert!(parse_datetime("2026-08-22 07:00:00").is_some());
        assert!(parse_datetime("yesterday-ish").is_none());
    }

    #[test]
    fn format_ts_round_trips() {
        let now = Utc::now();
        let parsed = parse_datetime(&format_ts(now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }
}
