use crate::domain::snapshot::{DailySnapshot, ListedStock};
use serde::Serialize;
use std::fmt;

/// `numerator/denominator=percent%`; percent is 0 when the denominator is 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatioMetric {
    pub numerator: usize,
    pub denominator: usize,
    pub percent: f64,
}

impl RatioMetric {
    pub fn new(numerator: usize, denominator: usize) -> Self {
        let percent = if denominator > 0 {
            numerator as f64 / denominator as f64 * 100.0
        } else {
            0.0
        };
        Self {
            numerator,
            denominator,
            percent,
        }
    }
}

impl fmt::Display for RatioMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}={:.1}%", self.numerator, self.denominator, self.percent)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SentimentMetrics {
    /// Yesterday's limit-ups that are up today.
    pub yesterday_limit_up_up_rate: RatioMetric,
    /// Yesterday's limit-ups that sealed limit-up again today.
    pub consecutive_rate: RatioMetric,
    /// Stocks that touched limit-up today but failed to close there.
    pub broken_board_rate: RatioMetric,
}

impl SentimentMetrics {
    pub fn compute(previous: &DailySnapshot, today: &DailySnapshot, touched: &[ListedStock]) -> Self {
        Self {
            yesterday_limit_up_up_rate: up_rate(previous),
            consecutive_rate: consecutive_rate(previous, today),
            broken_board_rate: broken_board_rate(touched, today),
        }
    }
}

/// Rows without a numeric latest change are left out of both sides.
pub fn up_rate(previous: &DailySnapshot) -> RatioMetric {
    let changes: Vec<f64> = previous
        .records
        .iter()
        .filter_map(|r| r.latest_change_pct)
        .filter(|v| !v.is_nan())
        .collect();
    let up = changes.iter().filter(|v| **v > 0.0).count();
    RatioMetric::new(up, changes.len())
}

pub fn consecutive_rate(previous: &DailySnapshot, today: &DailySnapshot) -> RatioMetric {
    let today_codes = today.codes();
    let previous_codes = previous.codes();
    let continued = previous_codes.intersection(&today_codes).count();
    RatioMetric::new(continued, previous.len())
}

pub fn broken_board_rate(touched: &[ListedStock], today: &DailySnapshot) -> RatioMetric {
    RatioMetric::new(touched.len(), touched.len() + today.len())
}

/// Limit-up / limit-down totals of both dates and their changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitCounts {
    pub previous_limit_up: usize,
    pub previous_limit_down: usize,
    pub selected_limit_up: usize,
    pub selected_limit_down: usize,
    pub limit_up_change: i64,
    pub limit_down_change: i64,
    pub limit_up_change_pct: f64,
    pub limit_down_change_pct: f64,
}

impl LimitCounts {
    pub fn new(
        previous_limit_up: usize,
        previous_limit_down: usize,
        selected_limit_up: usize,
        selected_limit_down: usize,
    ) -> Self {
        let limit_up_change = selected_limit_up as i64 - previous_limit_up as i64;
        let limit_down_change = selected_limit_down as i64 - previous_limit_down as i64;
        Self {
            previous_limit_up,
            previous_limit_down,
            selected_limit_up,
            selected_limit_down,
            limit_up_change,
            limit_down_change,
            limit_up_change_pct: pct_change(limit_up_change, previous_limit_up),
            limit_down_change_pct: pct_change(limit_down_change, previous_limit_down),
        }
    }

    /// `"+3 : -2"` summary used by the change card.
    pub fn change_label(&self) -> String {
        format!("{:+} : {:+}", self.limit_up_change, self.limit_down_change)
    }
}

fn pct_change(change: i64, base: usize) -> f64 {
    if base == 0 {
        return 0.0;
    }
    change as f64 / base as f64 * 100.0
}
