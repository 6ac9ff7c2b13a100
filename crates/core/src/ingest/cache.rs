use crate::ingest::provider::MarketDataSource;
use crate::ingest::query::SnapshotQuery;
use crate::ingest::types::RawRow;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Default time-to-live of a cached provider answer.
pub const DEFAULT_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedRows {
    pub rows: Vec<RawRow>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRows {
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.fetched_at >= ttl
    }
}

/// Key-value store for provider answers, keyed by [`SnapshotQuery`].
/// Expiry is decided by the reader ([`CachingSource`]), not the store.
#[async_trait::async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn load(&self, query: &SnapshotQuery) -> Result<Option<CachedRows>>;

    async fn store(&self, query: &SnapshotQuery, entry: &CachedRows) -> Result<()>;

    /// Drops entries fetched before `cutoff`; returns how many went.
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: tokio::sync::Mutex<HashMap<SnapshotQuery, CachedRows>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait::async_trait]
impl SnapshotCache for MemoryCache {
    async fn load(&self, query: &SnapshotQuery) -> Result<Option<CachedRows>> {
        Ok(self.entries.lock().await.get(query).cloned())
    }

    async fn store(&self, query: &SnapshotQuery, entry: &CachedRows) -> Result<()> {
        self.entries.lock().await.insert(*query, entry.clone());
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut guard = self.entries.lock().await;
        let before = guard.len();
        guard.retain(|_, e| e.fetched_at >= cutoff);
        Ok((before - guard.len()) as u64)
    }
}

/// Drops every entry that is stale at `now` under `ttl`.
pub async fn purge_stale(cache: &dyn SnapshotCache, ttl: Duration, now: DateTime<Utc>) -> Result<u64> {
    cache.purge_older_than(now - ttl).await
}

/// Background task purging stale entries every `every`. Stores such as [`MemoryCache`]
/// otherwise keep each queried (kind, date) for the life of the process.
pub fn spawn_purger(
    cache: Arc<dyn SnapshotCache>,
    ttl: Duration,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            match purge_stale(cache.as_ref(), ttl, Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "stale snapshot cache entries purged"),
                Err(err) => tracing::warn!(error = %err, "snapshot cache purge failed"),
            }
        }
    })
}

/// Serves fresh cache entries and falls through to `inner` otherwise. Cache failures
/// are logged and never fail the query.
pub struct CachingSource {
    inner: Arc<dyn MarketDataSource>,
    cache: Arc<dyn SnapshotCache>,
    ttl: Duration,
}

impl CachingSource {
    pub fn new(inner: Arc<dyn MarketDataSource>, cache: Arc<dyn SnapshotCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn fetch_rows_at(&self, query: &SnapshotQuery, now: DateTime<Utc>) -> Result<Vec<RawRow>> {
        match self.cache.load(query).await {
            Ok(Some(entry)) if !entry.is_stale(self.ttl, now) => {
                tracing::debug!(
                    kind = query.kind.as_str(),
                    trade_date = %query.trade_date,
                    fetched_at = %entry.fetched_at,
                    "snapshot cache hit"
                );
                return Ok(entry.rows);
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, kind = query.kind.as_str(), "snapshot cache load failed");
            }
        }

        let rows = self.inner.fetch_rows(query).await?;
        let entry = CachedRows {
            rows,
            fetched_at: now,
        };
        if let Err(err) = self.cache.store(query, &entry).await {
            tracing::warn!(error = %err, kind = query.kind.as_str(), "snapshot cache store failed");
        }
        Ok(entry.rows)
    }
}

#[async_trait::async_trait]
impl MarketDataSource for CachingSource {
    fn source_name(&self) -> &'static str {
        self.inner.source_name()
    }

    async fn fetch_rows(&self, query: &SnapshotQuery) -> Result<Vec<RawRow>> {
        self.fetch_rows_at(query, Utc::now()).await
    }
}
