//! Channel registry: the configured sources the collector reads.

use chrono::{DateTime, Utc};

use super::{format_ts, parse_datetime, DbPool, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct Channel {
    pub id: i64,
    pub handle: String,
    pub title: String,
    pub priority: i64,
    pub is_active: bool,
    pub last_item_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChannel {
    pub handle: String,
    pub title: String,
    pub priority: i64,
}

impl NewChannel {
    /// Priority is clamped to 0..=10 on the way in.
    pub fn new(handle: &str, title: &str, priority: i64) -> Self {
        Self {
            handle: handle.to_string(),
            title: title.to_string(),
            priority: priority.clamp(0, 10),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    handle: String,
    title: String,
    priority: i64,
    is_active: bool,
    last_item_id: i64,
    created_at: String,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            id: row.id,
            handle: row.handle,
            title: row.title,
            priority: row.priority,
            is_active: row.is_active,
            last_item_id: row.last_item_id,
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        }
    }
}

pub struct ChannelRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ChannelRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, channel: &NewChannel) -> StoreResult<Channel> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO channels (handle, title, priority, is_active, last_item_id, created_at)
            VALUES ($1, $2, $3, $4, 0, $5)
            RETURNING id
            "#,
        )
        .bind(&channel.handle)
        .bind(&channel.title)
        .bind(channel.priority)
        .bind(true)
        .bind(format_ts(Utc::now()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound("channel not found after insert".into()))
    }

    pub async fn get_by_id(&self, id: i64) -> StoreResult<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, handle, title, priority, is_active, last_item_id, created_at
            FROM channels
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.map(Channel::from))
    }

    pub async fn get_by_handle(&self, handle: &str) -> StoreResult<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, handle, title, priority, is_active, last_item_id, created_at
            FROM channels
            WHERE handle = $1
            "#,
        )
        .bind(handle)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.map(Channel::from))
    }

    /// Active channels in collection order: priority descending, then
    /// registration order. The ranking stage's tie-break depends on this.
    pub async fn list_active(&self) -> StoreResult<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, handle, title, priority, is_active, last_item_id, created_at
            FROM channels
            WHERE is_active = $1
            ORDER BY priority DESC, id ASC
            "#,
        )
        .bind(true)
        .fetch_all(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Channel::from).collect())
    }

    pub async fn list_all(&self) -> StoreResult<Vec<Channel>> {
        let rows = sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT id, handle, title, priority, is_active, last_item_id, created_at
            FROM channels
            ORDER BY id ASC
            "#,
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Channel::from).collect())
    }

    pub async fn set_active(&self, id: i64, active: bool) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE channels SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    /// Advance the last-seen item id. Only moves forward, so a stale write
    /// can never rewind the cursor.
    pub async fn advance_cursor(&self, id: i64, item_id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE channels SET last_item_id = $2 WHERE id = $1 AND last_item_id < $2",
        )
        .bind(id)
        .bind(item_id)
        .execute(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM channels WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
