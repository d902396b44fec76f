//! Key/value settings the pipeline reads at the start of every run.
//!
//! Rows are seeded once at migration; the management surface edits them
//! out of band.

use super::{DbPool, StoreError, StoreResult};

/// Seeded on migrate with `DO NOTHING`, so operator edits survive restarts.
const DEFAULT_SETTINGS: &[(&str, &str, &str)] = &[
    ("lookback_hours", "12", "How many hours back to search for new posts"),
    ("max_news_count", "10", "Maximum number of items in one digest"),
    (
        "relevance_threshold",
        "5",
        "Minimum relevance score (0-10) an item needs to be summarized",
    ),
    (
        "summary_max_length",
        "150",
        "Preferred summary length in characters; longer costs quality score",
    ),
    (
        "target_channel",
        "",
        "Publish destination; the DIGEST_TARGET_CHANNEL env var wins when set",
    ),
];

pub struct SettingsRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SettingsRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn set(&self, key: &str, value: &str, description: Option<&str>) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = excluded.value,
                description = COALESCE(excluded.description, settings.description)
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .execute(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn seed_defaults(&self) -> StoreResult<()> {
        for (key, value, description) in DEFAULT_SETTINGS {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, description)
                VALUES ($1, $2, $3)
                ON CONFLICT (key) DO NOTHING
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(description)
            .execute(self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        Ok(())
    }
}
