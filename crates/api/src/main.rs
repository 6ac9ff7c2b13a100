use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use limitup_core::domain::dashboard::Dashboard;
use limitup_core::domain::promotion::PromotionResult;
use limitup_core::domain::sector::{ColorMetric, Heatmap, HeatmapOptions, SizeMetric};
use limitup_core::ingest::cache::{spawn_purger, CachingSource, MemoryCache, SnapshotCache};
use limitup_core::service::LimitUpService;
use limitup_core::time::cn_market::TradingCalendar;

const MAX_LOOKBACK_DAYS: u32 = 30;
const CACHE_PURGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

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

    let cache: Arc<dyn SnapshotCache> = match connect_cache(&settings).await {
        Some(cache) => cache,
        None => Arc::new(MemoryCache::new()),
    };

    let purger = spawn_purger(cache.clone(), settings.snapshot_cache_ttl(), CACHE_PURGE_INTERVAL);

    let raw = limitup_core::raw_source_from_settings(&settings)?;
    let source = CachingSource::new(raw, cache, settings.snapshot_cache_ttl());
    let service = LimitUpService::new(Arc::new(source), TradingCalendar::from_env());

    tracing::info!(
        source = service.source_name(),
        ttl_secs = settings.snapshot_cache_ttl_secs,
        "snapshot source ready"
    );

    let state = AppState { service };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/trade-date/latest", get(get_latest_trade_date))
        .route("/limit-up/:trade_date/dashboard", get(get_dashboard))
        .route("/limit-up/:trade_date/promotion", get(get_promotion))
        .route("/sectors/heatmap", get(get_sector_heatmap))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purger.abort();
    Ok(())
}

/// Postgres-backed cache when the database is reachable; otherwise the API runs with an
/// in-process cache.
async fn connect_cache(settings: &limitup_core::config::Settings) -> Option<Arc<dyn SnapshotCache>> {
    let db_url = match settings.require_database_url() {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, "DATABASE_URL missing; using in-memory snapshot cache");
            return None;
        }
    };

    let pool = match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; using in-memory snapshot cache");
            return None;
        }
    };

    if let Err(e) = limitup_core::storage::migrate(&pool).await {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(error = %e, "db migrations failed; using in-memory snapshot cache");
        return None;
    }

    Some(Arc::new(
        limitup_core::storage::snapshot_cache::PgSnapshotCache::new(pool),
    ))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    service: LimitUpService,
}

#[derive(Debug, Serialize)]
struct ApiTradeDate {
    trade_date: NaiveDate,
    previous_trade_date: NaiveDate,
}

#[derive(Debug, Serialize)]
struct ApiPromotion {
    trade_date: NaiveDate,
    tiers: Vec<PromotionResult>,
}

#[derive(Debug, Default, Deserialize)]
struct HeatmapParams {
    color_metric: Option<ColorMetric>,
    size_metric: Option<SizeMetric>,
    lookback_days: Option<u32>,
}

async fn get_latest_trade_date(State(state): State<AppState>) -> Result<Json<ApiTradeDate>, StatusCode> {
    let calendar = state.service.calendar();
    let resolved = calendar
        .resolve_trade_date(None, Utc::now())
        .and_then(|d| Ok((d, calendar.previous_trading_day(d)?)));
    let (trade_date, previous_trade_date) = resolved.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ApiTradeDate {
        trade_date,
        previous_trade_date,
    }))
}

async fn get_dashboard(
    State(state): State<AppState>,
    Path(trade_date): Path<String>,
) -> Result<Json<Dashboard>, StatusCode> {
    let trade_date = parse_trade_date(state.service.calendar(), &trade_date)?;

    let dashboard = state.service.dashboard(trade_date).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(%trade_date, error = %e, "dashboard failed");
        StatusCode::BAD_GATEWAY
    })?;

    Ok(Json(dashboard))
}

async fn get_promotion(
    State(state): State<AppState>,
    Path(trade_date): Path<String>,
) -> Result<Json<ApiPromotion>, StatusCode> {
    let trade_date = parse_trade_date(state.service.calendar(), &trade_date)?;

    let tiers = state.service.promotion(trade_date).await.map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        tracing::error!(%trade_date, error = %e, "promotion failed");
        StatusCode::BAD_GATEWAY
    })?;

    Ok(Json(ApiPromotion { trade_date, tiers }))
}

async fn get_sector_heatmap(
    State(state): State<AppState>,
    Query(params): Query<HeatmapParams>,
) -> Result<Json<Heatmap>, StatusCode> {
    let options = heatmap_options(&params)?;
    let today = state
        .service
        .calendar()
        .resolve_trade_date(None, Utc::now())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let heatmap = state
        .service
        .sector_heatmap(today, options)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(%today, error = %e, "sector heatmap failed");
            StatusCode::BAD_GATEWAY
        })?;

    Ok(Json(heatmap))
}

fn parse_trade_date(calendar: &TradingCalendar, raw: &str) -> Result<NaiveDate, StatusCode> {
    calendar
        .resolve_trade_date(Some(raw), Utc::now())
        .map_err(|e| {
            tracing::debug!(raw, error = %e, "rejected trade date");
            StatusCode::BAD_REQUEST
        })
}

fn heatmap_options(params: &HeatmapParams) -> Result<HeatmapOptions, StatusCode> {
    let defaults = HeatmapOptions::default();
    let lookback_days = params.lookback_days.unwrap_or(defaults.lookback_days);
    if !(1..=MAX_LOOKBACK_DAYS).contains(&lookback_days) {
        return Err(StatusCode::BAD_REQUEST);
    }

    Ok(HeatmapOptions {
        color_metric: params.color_metric.unwrap_or(defaults.color_metric),
        size_metric: params.size_metric.unwrap_or(defaults.size_metric),
        lookback_days,
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
