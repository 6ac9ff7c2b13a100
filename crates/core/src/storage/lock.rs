use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};

// (classid, objid) advisory lock space: classid marks limit-up report runs, objid is the
// trade date as YYYYMMDD so a held lock reads directly off `pg_locks`.
const REPORT_RUN_CLASS: i32 = 0x4C55; // "LU"

fn lock_ids(trade_date: NaiveDate) -> (i32, i32) {
    let ymd = trade_date.year() * 10_000 + trade_date.month() as i32 * 100 + trade_date.day() as i32;
    (REPORT_RUN_CLASS, ymd)
}

/// Session-scoped lock held by one report run per trade date, so two runs never fill
/// the snapshot cache for the same date concurrently. Keeps the connection it was taken
/// on; advisory locks can only be released from their own session.
pub struct TradeDateLock {
    conn: PoolConnection<Postgres>,
    trade_date: NaiveDate,
}

impl TradeDateLock {
    /// `None` when another session already holds the date.
    pub async fn try_acquire(pool: &PgPool, trade_date: NaiveDate) -> anyhow::Result<Option<Self>> {
        let (class, obj) = lock_ids(trade_date);
        let mut conn = pool.acquire().await.context("failed to check out lock connection")?;
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1, $2)")
            .persistent(false)
            .bind(class)
            .bind(obj)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to lock trade date {trade_date}"))?;

        Ok(acquired.then_some(Self { conn, trade_date }))
    }

    pub async fn release(mut self) -> anyhow::Result<()> {
        let (class, obj) = lock_ids(self.trade_date);
        let (released,): (bool,) = sqlx::query_as("SELECT pg_advisory_unlock($1, $2)")
            .persistent(false)
            .bind(class)
            .bind(obj)
            .fetch_one(&mut *self.conn)
            .await
            .with_context(|| format!("failed to unlock trade date {}", self.trade_date))?;
        if !released {
            tracing::warn!(trade_date = %self.trade_date, "trade date lock was not held at release");
        }
        Ok(())
    }
}
