use crate::domain::dashboard::{build_dashboard, Dashboard, DashboardInputs};
use crate::domain::promotion::{self, PromotionResult};
use crate::domain::sector::{build_heatmap, process_bars, Heatmap, HeatmapOptions};
use crate::ingest::provider::{fetch_limit_up, fetch_listing, fetch_sector_bars, MarketDataSource};
use crate::ingest::query::QueryKind;
use crate::time::cn_market::TradingCalendar;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::sync::Arc;

/// Loads snapshots through a source and runs the calculators. Nothing computed here is
/// kept between calls; only the source may cache.
#[derive(Clone)]
pub struct LimitUpService {
    source: Arc<dyn MarketDataSource>,
    calendar: TradingCalendar,
}

impl LimitUpService {
    pub fn new(source: Arc<dyn MarketDataSource>, calendar: TradingCalendar) -> Self {
        Self { source, calendar }
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn source_name(&self) -> &'static str {
        self.source.source_name()
    }

    pub async fn load_inputs(&self, selected_date: NaiveDate) -> Result<DashboardInputs> {
        self.calendar.ensure_trading_day(selected_date)?;
        let previous_date = self.calendar.previous_trading_day(selected_date)?;
        let source = self.source.as_ref();

        let selected = fetch_limit_up(source, selected_date)
            .await
            .context("load selected limit-up snapshot")?;
        let previous = fetch_limit_up(source, previous_date)
            .await
            .context("load previous limit-up snapshot")?;
        let touched = fetch_listing(source, QueryKind::TouchedLimitUp, selected_date)
            .await
            .context("load touched limit-up list")?;
        let selected_limit_down = fetch_listing(source, QueryKind::LimitDown, selected_date)
            .await
            .context("load selected limit-down list")?;
        let previous_limit_down = fetch_listing(source, QueryKind::LimitDown, previous_date)
            .await
            .context("load previous limit-down list")?;

        tracing::info!(
            %selected_date,
            %previous_date,
            selected = selected.len(),
            previous = previous.len(),
            touched = touched.len(),
            selected_limit_down = selected_limit_down.len(),
            previous_limit_down = previous_limit_down.len(),
            "limit-up inputs loaded"
        );

        Ok(DashboardInputs {
            selected_date,
            previous_date,
            selected,
            previous,
            touched,
            selected_limit_down,
            previous_limit_down,
        })
    }

    pub async fn dashboard(&self, selected_date: NaiveDate) -> Result<Dashboard> {
        let inputs = self.load_inputs(selected_date).await?;
        Ok(build_dashboard(&inputs))
    }

    /// Promotion from the previous trading day into `selected_date`, every tier included.
    pub async fn promotion(&self, selected_date: NaiveDate) -> Result<Vec<PromotionResult>> {
        self.calendar.ensure_trading_day(selected_date)?;
        let previous_date = self.calendar.previous_trading_day(selected_date)?;
        let source = self.source.as_ref();

        let later = fetch_limit_up(source, selected_date).await?;
        let earlier = fetch_limit_up(source, previous_date).await?;
        Ok(promotion::compute(&earlier, &later))
    }

    pub async fn sector_heatmap(&self, today: NaiveDate, options: HeatmapOptions) -> Result<Heatmap> {
        let bars = fetch_sector_bars(self.source.as_ref(), today)
            .await
            .context("load industry board bars")?;
        let rows = process_bars(&bars);
        tracing::info!(%today, bars = bars.len(), rows = rows.len(), "industry board bars loaded");
        Ok(build_heatmap(&rows, today, options))
    }
}
