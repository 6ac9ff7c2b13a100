use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One industry board's daily bar as delivered by the provider. Numeric fields are
/// optional because the provider sometimes sends blanks or non-numeric text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorBar {
    pub board_name: String,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    /// Lots.
    pub volume: Option<f64>,
    /// CNY.
    pub amount: Option<f64>,
    pub amplitude: Option<f64>,
    pub change_pct: Option<f64>,
    pub turnover: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorRow {
    pub board_name: String,
    pub date: NaiveDate,
    pub change_pct: f64,
    pub turnover: Option<f64>,
    /// change_pct × turnover.
    pub strength: Option<f64>,
    /// Amount in 亿 (1e8 CNY).
    pub amount_yi: Option<f64>,
    /// Volume in 万手 (1e4 lots).
    pub volume_wan: Option<f64>,
}

/// Derives the heatmap columns and drops bars without a change percentage.
pub fn process_bars(bars: &[SectorBar]) -> Vec<SectorRow> {
    bars.iter()
        .filter_map(|b| {
            let change_pct = b.change_pct.filter(|v| v.is_finite())?;
            Some(SectorRow {
                board_name: b.board_name.clone(),
                date: b.date,
                change_pct,
                turnover: b.turnover,
                strength: b.turnover.map(|t| change_pct * t),
                amount_yi: b.amount.map(|a| a / 1e8),
                volume_wan: b.volume.map(|v| v / 10_000.0),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMetric {
    #[default]
    ChangePct,
    Turnover,
    Strength,
}

impl ColorMetric {
    pub fn value(&self, row: &SectorRow) -> Option<f64> {
        match self {
            Self::ChangePct => Some(row.change_pct),
            Self::Turnover => row.turnover,
            Self::Strength => row.strength,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeMetric {
    #[default]
    AmountYi,
    VolumeWan,
    Turnover,
}

impl SizeMetric {
    pub fn value(&self, row: &SectorRow) -> Option<f64> {
        match self {
            Self::AmountYi => row.amount_yi,
            Self::VolumeWan => row.volume_wan,
            Self::Turnover => row.turnover,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeatmapOptions {
    pub color_metric: ColorMetric,
    pub size_metric: SizeMetric,
    pub lookback_days: u32,
}

impl Default for HeatmapOptions {
    fn default() -> Self {
        Self {
            color_metric: ColorMetric::default(),
            size_metric: SizeMetric::default(),
            lookback_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapTile {
    pub board_name: String,
    pub date: NaiveDate,
    pub size: f64,
    pub color: f64,
    pub change_pct: f64,
    pub turnover: Option<f64>,
    pub amount_yi: Option<f64>,
    pub strength: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub options: HeatmapOptions,
    /// `[min, max]` of the color metric over the tiles; absent when there are none.
    pub color_range: Option<(f64, f64)>,
    pub tiles: Vec<HeatmapTile>,
}

/// Tiles for bars dated within `lookback_days` of `today`, biggest movers first.
/// Rows lacking the chosen size or color value cannot be drawn and are left out.
pub fn build_heatmap(rows: &[SectorRow], today: NaiveDate, options: HeatmapOptions) -> Heatmap {
    let since = today - Duration::days(i64::from(options.lookback_days));

    let mut tiles: Vec<HeatmapTile> = rows
        .iter()
        .filter(|r| r.date >= since)
        .filter_map(|r| {
            let size = options.size_metric.value(r)?;
            let color = options.color_metric.value(r)?;
            Some(HeatmapTile {
                board_name: r.board_name.clone(),
                date: r.date,
                size,
                color,
                change_pct: r.change_pct,
                turnover: r.turnover,
                amount_yi: r.amount_yi,
                strength: r.strength,
            })
        })
        .collect();

    tiles.sort_by(|a, b| {
        b.change_pct
            .partial_cmp(&a.change_pct)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.board_name.cmp(&b.board_name))
    });

    let color_range = tiles.iter().map(|t| t.color).fold(None, |acc, c| match acc {
        None => Some((c, c)),
        Some((lo, hi)) => Some((f64::min(lo, c), f64::max(hi, c))),
    });

    Heatmap {
        options,
        color_range,
        tiles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn bar(name: &str, date: NaiveDate, change_pct: Option<f64>) -> SectorBar {
        SectorBar {
            board_name: name.to_string(),
            date,
            open: Some(1.0),
            close: Some(1.0),
            high: Some(1.0),
            low: Some(1.0),
            volume: Some(250_000.0),
            amount: Some(3.5e9),
            amplitude: Some(2.0),
            change_pct,
            turnover: Some(2.0),
        }
    }

    #[test]
    fn derives_columns_and_drops_missing_change() {
        let rows = process_bars(&[bar("半导体", d(10), Some(1.5)), bar("银行", d(10), None)]);
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.strength, Some(3.0));
        assert_eq!(r.amount_yi, Some(35.0));
        assert_eq!(r.volume_wan, Some(25.0));
    }

    #[test]
    fn heatmap_filters_by_lookback_and_sorts_by_change() {
        let rows = process_bars(&[
            bar("旧", d(1), Some(9.0)),
            bar("半导体", d(10), Some(1.5)),
            bar("军工", d(9), Some(-2.0)),
            bar("汽车", d(10), Some(4.0)),
        ]);

        let opts = HeatmapOptions {
            lookback_days: 3,
            ..Default::default()
        };
        let map = build_heatmap(&rows, d(10), opts);
        let names: Vec<_> = map.tiles.iter().map(|t| t.board_name.as_str()).collect();
        assert_eq!(names, vec!["汽车", "半导体", "军工"]);
        assert_eq!(map.color_range, Some((-2.0, 4.0)));
        assert_eq!(map.tiles[0].size, 35.0);
    }

    #[test]
    fn strength_color_metric_and_empty_range() {
        let rows = process_bars(&[bar("汽车", d(10), Some(4.0))]);
        let opts = HeatmapOptions {
            color_metric: ColorMetric::Strength,
            size_metric: SizeMetric::Turnover,
            lookback_days: 1,
        };
        let map = build_heatmap(&rows, d(10), opts);
        assert_eq!(map.tiles[0].color, 8.0);
        assert_eq!(map.tiles[0].size, 2.0);

        let empty = build_heatmap(&[], d(10), HeatmapOptions::default());
        assert!(empty.tiles.is_empty());
        assert_eq!(empty.color_range, None);
    }

    #[test]
    fn metrics_deserialize_from_snake_case() {
        let m: ColorMetric = serde_json::from_str("\"strength\"").unwrap();
        assert_eq!(m, ColorMetric::Strength);
        let s: SizeMetric = serde_json::from_str("\"volume_wan\"").unwrap();
        assert_eq!(s, SizeMetric::VolumeWan);
    }
}
