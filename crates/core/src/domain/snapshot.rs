use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Delimiter the provider uses to join several limit-up reasons into one string.
pub const TAG_DELIMITER: char = '+';

/// Placeholder used whenever the provider did not supply a reason column.
pub const UNKNOWN_TAG: &str = "未知";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitUpRecord {
    pub stock_code: String,
    pub stock_name: String,
    pub consecutive_limit_days: u32,
    pub limit_reason_tags: Vec<String>,
    /// Latest % change reported alongside the record, when the provider has one.
    #[serde(default)]
    pub latest_change_pct: Option<f64>,
}

impl LimitUpRecord {
    pub fn new(
        stock_code: impl Into<String>,
        stock_name: impl Into<String>,
        consecutive_limit_days: u32,
        raw_tags: &str,
    ) -> Self {
        Self {
            stock_code: stock_code.into(),
            stock_name: stock_name.into(),
            consecutive_limit_days,
            limit_reason_tags: split_tags(raw_tags),
            latest_change_pct: None,
        }
    }

    /// Tags joined back into the provider's display form, `未知` when there are none.
    pub fn reason_label(&self) -> String {
        if self.limit_reason_tags.is_empty() {
            return UNKNOWN_TAG.to_string();
        }
        self.limit_reason_tags.join("+")
    }
}

/// All stocks matching one limit-state query on one trade date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailySnapshot {
    pub trade_date: Option<NaiveDate>,
    pub records: Vec<LimitUpRecord>,
}

impl DailySnapshot {
    pub fn new(trade_date: NaiveDate, records: Vec<LimitUpRecord>) -> Self {
        Self {
            trade_date: Some(trade_date),
            records,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn max_consecutive_days(&self) -> u32 {
        self.records
            .iter()
            .map(|r| r.consecutive_limit_days)
            .max()
            .unwrap_or(0)
    }

    pub fn with_days(&self, days: u32) -> impl Iterator<Item = &LimitUpRecord> {
        self.records
            .iter()
            .filter(move |r| r.consecutive_limit_days == days)
    }

    pub fn codes(&self) -> HashSet<&str> {
        self.records.iter().map(|r| r.stock_code.as_str()).collect()
    }
}

/// A stock that merely appears in a query result (touched limit-up, limit-down).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedStock {
    pub stock_code: String,
    pub stock_name: String,
    #[serde(default)]
    pub latest_change_pct: Option<f64>,
}

/// Splits a raw reason string such as `"AI+芯片"` into trimmed, non-empty tags.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(TAG_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_plus_and_drops_blanks() {
        assert_eq!(split_tags("AI+芯片"), vec!["AI", "芯片"]);
        assert_eq!(split_tags(" AI + +软件 "), vec!["AI", "软件"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn reason_label_falls_back_to_unknown() {
        let r = LimitUpRecord::new("000001", "平安银行", 1, "");
        assert_eq!(r.reason_label(), UNKNOWN_TAG);

        let r = LimitUpRecord::new("000001", "平安银行", 1, "AI+芯片");
        assert_eq!(r.reason_label(), "AI+芯片");
    }

    #[test]
    fn max_days_of_empty_snapshot_is_zero() {
        assert_eq!(DailySnapshot::empty().max_consecutive_days(), 0);
    }
}
