use crate::config::Settings;
use crate::domain::sector::SectorBar;
use crate::domain::snapshot::{DailySnapshot, ListedStock};
use crate::ingest::adapter;
use crate::ingest::query::{QueryKind, SnapshotQuery, SORT_KEY, SORT_ORDER};
use crate::ingest::types::{QueryResponse, RawRow};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/query";
const DEFAULT_RETRIES: u32 = 3;
const MAX_RETRIES: u32 = 10;
const MAX_BACKOFF_SHIFT: u32 = 6;

/// Anything that can answer a [`SnapshotQuery`] with provider-shaped rows.
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_rows(&self, query: &SnapshotQuery) -> Result<Vec<RawRow>>;
}

pub async fn fetch_limit_up(source: &dyn MarketDataSource, trade_date: NaiveDate) -> Result<DailySnapshot> {
    let query = SnapshotQuery::new(QueryKind::LimitUp, trade_date);
    let rows = source.fetch_rows(&query).await?;
    adapter::adapt_limit_up(&rows, trade_date)
        .with_context(|| format!("failed to adapt {} rows for {trade_date}", query.kind.as_str()))
}

pub async fn fetch_listing(
    source: &dyn MarketDataSource,
    kind: QueryKind,
    trade_date: NaiveDate,
) -> Result<Vec<ListedStock>> {
    let query = SnapshotQuery::new(kind, trade_date);
    let rows = source.fetch_rows(&query).await?;
    adapter::adapt_listing(&rows)
        .with_context(|| format!("failed to adapt {} rows for {trade_date}", kind.as_str()))
}

pub async fn fetch_sector_bars(source: &dyn MarketDataSource, trade_date: NaiveDate) -> Result<Vec<SectorBar>> {
    let query = SnapshotQuery::new(QueryKind::IndustryBoards, trade_date);
    let rows = source.fetch_rows(&query).await?;
    Ok(adapter::adapt_sector_bars(&rows))
}

#[derive(Debug, Clone)]
pub struct HttpJsonSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_data_provider_base_url()?.to_string();
        let api_key = settings.data_provider_api_key.clone();

        let timeout_secs = std::env::var("DATA_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("DATA_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .clamp(1, MAX_RETRIES);

        let path = std::env::var("DATA_PROVIDER_QUERY_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build data provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(&self, query: &SnapshotQuery) -> Result<QueryResponse> {
        let url = self.url();
        let headers = self.headers()?;

        let res = self
            .http
            .get(url)
            .headers(headers)
            .query(&[
                ("q", query.query_text()),
                ("kind", query.kind.as_str().to_string()),
                ("trade_date", query.trade_date.to_string()),
                ("sort_key", SORT_KEY.to_string()),
                ("sort_order", SORT_ORDER.to_string()),
            ])
            .send()
            .await
            .context("data provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read provider response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("provider response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("data provider HTTP {status}: {raw_json}");
        }

        serde_json::from_value::<QueryResponse>(raw_json)
            .context("failed to parse provider response into QueryResponse")
    }
}

#[async_trait::async_trait]
impl MarketDataSource for HttpJsonSource {
    fn source_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_rows(&self, query: &SnapshotQuery) -> Result<Vec<RawRow>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(query).await {
                Ok(resp) => {
                    tracing::debug!(
                        kind = query.kind.as_str(),
                        trade_date = %query.trade_date,
                        rows = resp.rows.len(),
                        "provider query answered"
                    );
                    return Ok(resp.rows);
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err, "data provider fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// 1s, 2s, 4s, ... capped at 64s.
fn retry_backoff(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_secs(1u64 << shift)
}

/// Reads exported query results from `<dir>/<kind>_<YYYYMMDD>.json`. Each file holds
/// either a bare array of rows or a `{"rows": [...]}` object. A missing file is an
/// absent snapshot, not an error.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, query: &SnapshotQuery) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", query.kind.as_str(), query.ymd()))
    }
}

#[async_trait::async_trait]
impl MarketDataSource for JsonDirSource {
    fn source_name(&self) -> &'static str {
        "json_dir"
    }

    async fn fetch_rows(&self, query: &SnapshotQuery) -> Result<Vec<RawRow>> {
        let path = self.path_for(query);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "snapshot export not found; treating as empty");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        parse_rows(&text).with_context(|| format!("failed to parse {}", path.display()))
    }
}

fn parse_rows(text: &str) -> Result<Vec<RawRow>> {
    let v = serde_json::from_str::<Value>(text)?;
    match v {
        Value::Array(_) => Ok(serde_json::from_value(v)?),
        other => Ok(serde_json::from_value::<QueryResponse>(other)?.rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_bare_arrays_and_wrapped_rows() {
        let bare = json!([{"股票代码": "000001"}]).to_string();
        assert_eq!(parse_rows(&bare).unwrap().len(), 1);

        let wrapped = json!({"query": "非ST,20250307涨停", "rows": [{"股票代码": "000001"}, {"股票代码": "000002"}]})
            .to_string();
        assert_eq!(parse_rows(&wrapped).unwrap().len(), 2);
    }

    #[test]
    fn retry_backoff_doubles_then_caps() {
        assert_eq!(retry_backoff(1), Duration::from_secs(1));
        assert_eq!(retry_backoff(3), Duration::from_secs(4));
        assert_eq!(retry_backoff(7), Duration::from_secs(64));
        assert_eq!(retry_backoff(65), Duration::from_secs(64));
        assert_eq!(retry_backoff(u32::MAX), Duration::from_secs(64));
    }

    #[test]
    fn rejects_rows_that_are_not_objects() {
        let bad = json!({"rows": [1, 2]}).to_string();
        assert!(parse_rows(&bad).is_err());
    }

    #[tokio::test]
    async fn json_dir_source_reads_exports_and_tolerates_missing_files() {
        let dir = std::env::temp_dir().join(format!("limitup-json-dir-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        let source = JsonDirSource::new(dir.clone());
        let query = SnapshotQuery::new(QueryKind::LimitUp, date);
        assert!(source.path_for(&query).ends_with("limit_up_20250307.json"));

        let body = json!([
            {"股票代码": "000001", "股票简称": "平安银行", "连续涨停天数[20250307]": 2, "涨停原因类别[20250307]": "银行"}
        ]);
        tokio::fs::write(source.path_for(&query), body.to_string()).await.unwrap();

        let snap = fetch_limit_up(&source, date).await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.records[0].consecutive_limit_days, 2);

        let down = fetch_listing(&source, QueryKind::LimitDown, date).await.unwrap();
        assert!(down.is_empty());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
