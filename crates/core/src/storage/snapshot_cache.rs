use crate::ingest::cache::{CachedRows, SnapshotCache};
use crate::ingest::query::SnapshotQuery;
use crate::ingest::types::RawRow;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Provider answers persisted in Postgres so separate processes share one cache.
#[derive(Debug, Clone)]
pub struct PgSnapshotCache {
    pool: sqlx::PgPool,
}

impl PgSnapshotCache {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SnapshotCache for PgSnapshotCache {
    async fn load(&self, query: &SnapshotQuery) -> Result<Option<CachedRows>> {
        let row = sqlx::query_as::<_, (Value, DateTime<Utc>)>(
            "SELECT rows, fetched_at \
             FROM snapshot_cache \
             WHERE query_kind = $1 AND trade_date = $2",
        )
        .persistent(false)
        .bind(query.kind.as_str())
        .bind(query.trade_date)
        .fetch_optional(&self.pool)
        .await
        .context("select snapshot_cache failed")?;

        let Some((rows, fetched_at)) = row else {
            return Ok(None);
        };

        let rows = serde_json::from_value::<Vec<RawRow>>(rows)
            .context("snapshot_cache rows are not an array of objects")?;
        Ok(Some(CachedRows { rows, fetched_at }))
    }

    async fn store(&self, query: &SnapshotQuery, entry: &CachedRows) -> Result<()> {
        let rows = serde_json::to_value(&entry.rows).context("serialize cached rows failed")?;

        sqlx::query(
            "INSERT INTO snapshot_cache (query_kind, trade_date, query_text, rows, fetched_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (query_kind, trade_date) DO UPDATE SET \
               query_text = EXCLUDED.query_text, \
               rows = EXCLUDED.rows, \
               fetched_at = EXCLUDED.fetched_at",
        )
        .persistent(false)
        .bind(query.kind.as_str())
        .bind(query.trade_date)
        .bind(query.query_text())
        .bind(rows)
        .bind(entry.fetched_at)
        .execute(&self.pool)
        .await
        .context("upsert snapshot_cache failed")?;
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let res = sqlx::query("DELETE FROM snapshot_cache WHERE fetched_at < $1")
            .persistent(false)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .context("purge snapshot_cache failed")?;
        Ok(res.rows_affected())
    }
}
