//! Dedup ledger: (channel, item) pairs that already went out in a digest.
//!
//! Marking is an upsert keyed on the pair, so repeating a mark is a no-op
//! and the first write's audit text wins.

use chrono::Utc;

use super::{format_ts, DbPool, StoreError, StoreResult};

pub struct ProcessedRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ProcessedRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn mark_processed(
        &self,
        channel_id: i64,
        item_id: i64,
        raw_text: &str,
        summary: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO processed_items (channel_id, item_id, raw_text, summary, processed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (channel_id, item_id) DO NOTHING
            "#,
        )
        .bind(channel_id)
        .bind(item_id)
        .bind(raw_text)
        .bind(summary)
        .bind(format_ts(Utc::now()))
        .execute(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn is_processed(&self, channel_id: i64, item_id: i64) -> StoreResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM processed_items WHERE channel_id = $1 AND item_id = $2",
        )
        .bind(channel_id)
        .bind(item_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count > 0)
    }

    pub async fn count(&self) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM processed_items")
            .fetch_one(self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewChannel, Store};

    async fn setup() -> (Store, i64) {
        let store = Store::open_in_memory().await.unwrap();
        let ch = store
            .channels()
            .create(&NewChannel::new("feed", "Feed", 5))
            .await
            .unwrap();
        (store, ch.id)
    }

    #[tokio::test]
    async fn mark_is_idempotent() {
        let (store, channel_id) = setup().await;
        let ledger = store.ledger();

        assert!(!ledger.is_processed(channel_id, 42).await.unwrap());

        ledger
            .mark_processed(channel_id, 42, "raw text", "short summary")
            .await
            .unwrap();
        ledger
            .mark_processed(channel_id, 42, "other raw", "other summary")
            .await
            .unwrap();

        assert!(ledger.is_processed(channel_id, 42).await.unwrap());
        assert_eq!(ledger.count().await.unwrap(), 1);

        // First write's audit columns survive the repeat.
        let summary: String =
            sqlx::query_scalar("SELECT summary FROM processed_items WHERE item_id = 42")
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(summary, "short summary");
    }

    #[tokio::test]
    async fn pairs_are_independent_per_channel() {
        let (store, channel_id) = setup().await;
        let other = store
            .channels()
            .create(&NewChannel::new("feed2", "Feed 2", 5))
            .await
            .unwrap();
        let ledger = store.ledger();

        ledger.mark_processed(channel_id, 7, "", "").await.unwrap();

        assert!(ledger.is_processed(channel_id, 7).await.unwrap());
        assert!(!ledger.is_processed(other.id, 7).await.unwrap());
    }
}
