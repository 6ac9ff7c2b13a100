use anyhow::Context;
use clap::Parser;
use limitup_core::domain::sector::{ColorMetric, HeatmapOptions, SizeMetric};
use limitup_core::ingest::cache::{purge_stale, CachingSource, MemoryCache, SnapshotCache};
use limitup_core::service::LimitUpService;
use limitup_core::storage::lock::TradeDateLock;
use limitup_core::time::cn_market::TradingCalendar;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod report;

#[derive(Debug, Parser)]
#[command(name = "limitup_worker")]
struct Args {
    /// Trade date (YYYY-MM-DD). Defaults to the latest closed A-share session.
    #[arg(long)]
    trade_date: Option<String>,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Sector heatmap lookback in days.
    #[arg(long, default_value_t = 7)]
    lookback_days: u32,

    /// Skip the database: no persistent cache, no lock.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = limitup_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    anyhow::ensure!(
        (1..=30).contains(&args.lookback_days),
        "lookback days must be 1..=30 (got {})",
        args.lookback_days
    );

    let calendar = TradingCalendar::from_env();
    let trade_date = calendar.resolve_trade_date(args.trade_date.as_deref(), chrono::Utc::now())?;
    let heatmap_options = HeatmapOptions {
        color_metric: ColorMetric::ChangePct,
        size_metric: SizeMetric::AmountYi,
        lookback_days: args.lookback_days,
    };

    let raw = limitup_core::raw_source_from_settings(&settings)?;
    let ttl = settings.snapshot_cache_ttl();

    if args.dry_run {
        let source = CachingSource::new(raw, Arc::new(MemoryCache::new()), ttl);
        let service = LimitUpService::new(Arc::new(source), calendar);
        let report = report::build(&service, trade_date, heatmap_options).await?;
        report::write(&report, args.output.as_deref()).await?;
        tracing::info!(%trade_date, dry_run = true, "limit-up report written");
        return Ok(());
    }

    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    limitup_core::storage::migrate(&pool).await?;

    let Some(lock) = TradeDateLock::try_acquire(&pool, trade_date).await? else {
        tracing::warn!(%trade_date, "trade date lock not acquired; another run in progress");
        return Ok(());
    };

    let cache: Arc<dyn SnapshotCache> = Arc::new(
        limitup_core::storage::snapshot_cache::PgSnapshotCache::new(pool.clone()),
    );
    let source = CachingSource::new(raw, cache.clone(), ttl);
    let service = LimitUpService::new(Arc::new(source), calendar);

    let result = async {
        let report = report::build(&service, trade_date, heatmap_options).await?;
        report::write(&report, args.output.as_deref()).await?;

        let purged = purge_stale(cache.as_ref(), ttl, chrono::Utc::now()).await?;
        tracing::info!(%trade_date, purged, "limit-up report written; stale cache entries purged");
        anyhow::Ok(())
    }
    .await;

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(%trade_date, error = %err, "limit-up run failed");
    }

    if let Err(err) = lock.release().await {
        tracing::warn!(%trade_date, error = %err, "trade date lock release failed");
    }
    result
}

fn init_sentry(settings: &limitup_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
