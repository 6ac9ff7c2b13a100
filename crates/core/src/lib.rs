pub mod domain;
pub mod ingest;
pub mod service;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub data_provider_base_url: Option<String>,
        pub data_provider_api_key: Option<String>,
        pub data_dir: Option<String>,
        pub snapshot_cache_ttl_secs: i64,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let snapshot_cache_ttl_secs = match std::env::var("SNAPSHOT_CACHE_TTL_SECS") {
                Ok(s) => s
                    .trim()
                    .parse::<i64>()
                    .with_context(|| format!("SNAPSHOT_CACHE_TTL_SECS must be an integer (got {s:?})"))?,
                Err(_) => crate::ingest::cache::DEFAULT_TTL_SECS,
            };
            anyhow::ensure!(
                snapshot_cache_ttl_secs >= 0,
                "SNAPSHOT_CACHE_TTL_SECS must be >= 0"
            );

            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                data_provider_base_url: std::env::var("DATA_PROVIDER_BASE_URL").ok(),
                data_provider_api_key: std::env::var("DATA_PROVIDER_API_KEY").ok(),
                data_dir: std::env::var("LIMITUP_DATA_DIR").ok(),
                snapshot_cache_ttl_secs,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_data_provider_base_url(&self) -> anyhow::Result<&str> {
            self.data_provider_base_url
                .as_deref()
                .context("DATA_PROVIDER_BASE_URL is required")
        }

        pub fn snapshot_cache_ttl(&self) -> chrono::Duration {
            chrono::Duration::seconds(self.snapshot_cache_ttl_secs)
        }
    }
}

/// Picks the raw source from settings: a local export directory wins over the HTTP
/// provider.
pub fn raw_source_from_settings(
    settings: &config::Settings,
) -> anyhow::Result<std::sync::Arc<dyn ingest::provider::MarketDataSource>> {
    if let Some(dir) = settings.data_dir.as_deref() {
        tracing::info!(data_dir = dir, "using exported snapshots");
        return Ok(std::sync::Arc::new(ingest::provider::JsonDirSource::new(dir)));
    }
    Ok(std::sync::Arc::new(
        ingest::provider::HttpJsonSource::from_settings(settings)?,
    ))
}
