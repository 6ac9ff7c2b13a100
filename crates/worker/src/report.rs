use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use limitup_core::domain::dashboard::Dashboard;
use limitup_core::domain::sector::{Heatmap, HeatmapOptions};
use limitup_core::service::LimitUpService;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub trade_date: NaiveDate,
    pub source: &'static str,
    pub generated_at: DateTime<Utc>,
    pub dashboard: Dashboard,
    pub heatmap: Heatmap,
}

pub async fn build(
    service: &LimitUpService,
    trade_date: NaiveDate,
    heatmap_options: HeatmapOptions,
) -> anyhow::Result<RunReport> {
    let dashboard = service.dashboard(trade_date).await?;
    let heatmap = service.sector_heatmap(trade_date, heatmap_options).await?;

    let report = RunReport {
        trade_date,
        source: service.source_name(),
        generated_at: Utc::now(),
        dashboard,
        heatmap,
    };
    log_summary(&report);
    Ok(report)
}

fn log_summary(report: &RunReport) {
    let dash = &report.dashboard;
    tracing::info!(
        trade_date = %report.trade_date,
        previous_date = %dash.previous_date,
        up_rate = %dash.sentiment.yesterday_limit_up_up_rate,
        consecutive_rate = %dash.sentiment.consecutive_rate,
        broken_board_rate = %dash.sentiment.broken_board_rate,
        limit_changes = %dash.counts.change_label(),
        "sentiment"
    );
    for panel in &dash.promotion {
        tracing::info!(tier = %panel.label, rate = %panel.rate, total = panel.total, "promotion");
    }
    if let Some(top) = dash.concepts.first() {
        tracing::info!(concept = %top.concept, count = top.selected, change = top.change, "top concept");
    }
}

pub async fn write(report: &RunReport, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize report failed")?;
    match output {
        Some(path) => tokio::fs::write(path, json)
            .await
            .with_context(|| format!("failed to write report to {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limitup_core::ingest::provider::MarketDataSource;
    use limitup_core::ingest::query::{QueryKind, SnapshotQuery};
    use limitup_core::ingest::types::RawRow;
    use limitup_core::time::cn_market::TradingCalendar;
    use serde_json::json;
    use std::sync::Arc;

    struct StaticSource;

    #[async_trait::async_trait]
    impl MarketDataSource for StaticSource {
        fn source_name(&self) -> &'static str {
            "static"
        }

        async fn fetch_rows(&self, query: &SnapshotQuery) -> anyhow::Result<Vec<RawRow>> {
            let ymd = query.ymd();
            let v = match query.kind {
                QueryKind::LimitUp => json!([{
                    "股票代码": "000001",
                    "股票简称": "平安银行",
                    format!("连续涨停天数[{ymd}]"): 1,
                    format!("涨停原因类别[{ymd}]"): "银行+金融"
                }]),
                _ => json!([]),
            };
            Ok(serde_json::from_value(v)?)
        }
    }

    #[tokio::test]
    async fn builds_and_writes_report() {
        let service = LimitUpService::new(Arc::new(StaticSource), TradingCalendar::default());
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();

        let report = build(&service, date, HeatmapOptions::default()).await.unwrap();
        assert_eq!(report.source, "static");
        assert_eq!(report.dashboard.previous_date, NaiveDate::from_ymd_opt(2025, 3, 6).unwrap());
        // Same stock on both days at 1 day: neither promoted nor failed.
        assert_eq!(report.dashboard.promotion[0].rate.to_string(), "0/1=0%");
        assert!(report.heatmap.tiles.is_empty());

        let path = std::env::temp_dir().join(format!("limitup-report-{}.json", std::process::id()));
        write(&report, Some(path.as_path())).await.unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written["trade_date"], "2025-03-07");
        assert_eq!(written["dashboard"]["promotion"][0]["label"], "1进2");
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
