//! Run ledger: one row per pipeline cycle.
//!
//! A record is written exactly twice: inserted as `started` before any
//! pipeline work, then moved to `completed` or `failed` once. The terminal
//! updates are guarded on `status = 'started'` so a record cannot reach a
//! terminal state twice.

use chrono::{DateTime, Duration, Utc};

use super::{format_ts, parse_datetime, DbPool, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Started,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    // Rows are only ever written by this module; anything unexpected is
    // treated as a failed run.
    fn parse(s: &str) -> RunStatus {
        match s {
            "started" => RunStatus::Started,
            "completed" => RunStatus::Completed,
            _ => RunStatus::Failed,
        }
    }
}

/// Aggregate counters carried into the terminal update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub sources_processed: u32,
    pub items_collected: u32,
    pub items_published: u32,
}

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub sources_processed: i64,
    pub items_collected: i64,
    pub items_published: i64,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RunRow {
    id: i64,
    started_at: String,
    completed_at: Option<String>,
    status: String,
    sources_processed: i64,
    items_collected: i64,
    items_published: i64,
    error_message: Option<String>,
}

impl From<RunRow> for RunRecord {
    fn from(row: RunRow) -> Self {
        RunRecord {
            id: row.id,
            started_at: parse_datetime(&row.started_at).unwrap_or_else(Utc::now),
            completed_at: row.completed_at.as_deref().and_then(parse_datetime),
            status: RunStatus::parse(&row.status),
            sources_processed: row.sources_processed,
            items_collected: row.items_collected,
            items_published: row.items_published,
            error_message: row.error_message,
        }
    }
}

pub struct RunRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> RunRepository<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert the `started` record and return its id.
    pub async fn start(&self, started_at: DateTime<Utc>) -> StoreResult<i64> {
        sqlx::query_scalar(
            r#"
            INSERT INTO run_records (started_at, status)
            VALUES ($1, 'started')
            RETURNING id
            "#,
        )
        .bind(format_ts(started_at))
        .fetch_one(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Terminal success update. Returns false when the record had already
    /// left the `started` state.
    pub async fn complete(&self, id: i64, counters: &RunCounters) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE run_records
            SET status = 'completed',
                completed_at = $2,
                sources_processed = $3,
                items_collected = $4,
                items_published = $5
            WHERE id = $1 AND status = 'started'
            "#,
        )
        .bind(id)
        .bind(format_ts(Utc::now()))
        .bind(counters.sources_processed as i64)
        .bind(counters.items_collected as i64)
        .bind(counters.items_published as i64)
        .execute(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Terminal failure update, same at-most-once guard as [`complete`].
    pub async fn fail(&self, id: i64, error: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE run_records
            SET status = 'failed',
                completed_at = $2,
                error_message = $3
            WHERE id = $1 AND status = 'started'
            "#,
        )
        .bind(id)
        .bind(format_ts(Utc::now()))
        .bind(error)
        .execute(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, id: i64) -> StoreResult<Option<RunRecord>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, started_at, completed_at, status, sources_processed,
                   items_collected, items_published, error_message
            FROM run_records
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.map(RunRecord::from))
    }

    /// True when a `started` record younger than `window` exists. Records
    /// older than the window belong to crashed runs and are ignored.
    pub async fn has_live_run(&self, now: DateTime<Utc>, window: Duration) -> StoreResult<bool> {
        let cutoff = format_ts(now - window);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM run_records WHERE status = 'started' AND started_at > $1",
        )
        .bind(cutoff)
        .fetch_one(self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn setup() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn start_then_complete() {
        let store = setup().await;
        let runs = store.runs();

        let id = runs.start(Utc::now()).await.unwrap();
        let record = runs.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Started);
        assert!(record.completed_at.is_none());

        let counters = RunCounters {
            sources_processed: 2,
            items_collected: 14,
            items_published: 5,
        };
        assert!(runs.complete(id, &counters).await.unwrap());

        let record = runs.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.sources_processed, 2);
        assert_eq!(record.items_collected, 14);
        assert_eq!(record.items_published, 5);
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn terminal_transition_happens_once() {
        let store = setup().await;
        let runs = store.runs();

        let id = runs.start(Utc::now()).await.unwrap();
        assert!(runs.fail(id, "publish transport failed").await.unwrap());

        // Second terminal write of either kind is rejected.
        assert!(!runs.complete(id, &RunCounters::default()).await.unwrap());
        assert!(!runs.fail(id, "later error").await.unwrap());

        let record = runs.get(id).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("publish transport failed"));
    }

    #[tokio::test]
    async fn live_run_detection_ignores_stale_records() {
        let store = setup().await;
        let runs = store.runs();
        let now = Utc::now();

        // Fresh started record blocks.
        let id = runs.start(now).await.unwrap();
        assert!(runs.has_live_run(now, Duration::minutes(5)).await.unwrap());

        runs.complete(id, &RunCounters::default()).await.unwrap();
        assert!(!runs.has_live_run(now, Duration::minutes(5)).await.unwrap());

        // A started record older than the window does not block.
        runs.start(now - Duration::minutes(30)).await.unwrap();
        assert!(!runs.has_live_run(now, Duration::minutes(5)).await.unwrap());
    }
}
