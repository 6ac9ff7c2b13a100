//! Maps provider rows onto the typed schema. Provider column names (several of them
//! suffixed with `[YYYYMMDD]`) stop here and never reach the calculators.

use crate::domain::sector::SectorBar;
use crate::domain::snapshot::{split_tags, DailySnapshot, LimitUpRecord, ListedStock, UNKNOWN_TAG};
use crate::ingest::types::RawRow;
use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashSet;

pub const CODE_COL: &str = "股票代码";
pub const NAME_COL: &str = "股票简称";
pub const LATEST_CHANGE_COL: &str = "最新涨跌幅";
const DAYS_COL: &str = "连续涨停天数";
const REASON_COL: &str = "涨停原因类别";

const BOARD_NAME_COL: &str = "板块名称";
const BOARD_DATE_COL: &str = "日期";

pub fn days_col(trade_date: NaiveDate) -> String {
    dated_col(DAYS_COL, trade_date)
}

pub fn reason_col(trade_date: NaiveDate) -> String {
    dated_col(REASON_COL, trade_date)
}

fn dated_col(base: &str, trade_date: NaiveDate) -> String {
    format!("{base}[{}]", trade_date.format("%Y%m%d"))
}

/// Date-suffixed column first, then the bare name some exports use.
fn lookup<'a>(row: &'a RawRow, base: &str, dated: &str) -> Option<&'a Value> {
    row.get(dated).or_else(|| row.get(base))
}

/// Builds a limit-up snapshot. A row without a usable streak count is skipped; a row
/// without the reason column gets the `未知` tag.
pub fn adapt_limit_up(rows: &[RawRow], trade_date: NaiveDate) -> Result<DailySnapshot> {
    let days_key = days_col(trade_date);
    let reason_key = reason_col(trade_date);

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let stock_code = required_text(row, CODE_COL, idx)?;
        let stock_name = to_text(row.get(NAME_COL)).unwrap_or_default();

        let days = lookup(row, DAYS_COL, &days_key).and_then(|v| to_streak(Some(v)));
        let Some(days) = days else {
            tracing::warn!(idx, %stock_code, %trade_date, "limit-up row without streak count; skipping");
            continue;
        };

        if !seen.insert(stock_code.clone()) {
            tracing::warn!(idx, %stock_code, %trade_date, "duplicate stock code in limit-up rows; keeping first");
            continue;
        }

        let limit_reason_tags = match lookup(row, REASON_COL, &reason_key) {
            None => vec![UNKNOWN_TAG.to_string()],
            Some(v) => to_text(Some(v)).map(|s| split_tags(&s)).unwrap_or_default(),
        };

        records.push(LimitUpRecord {
            stock_code,
            stock_name,
            consecutive_limit_days: days,
            limit_reason_tags,
            latest_change_pct: to_number(row.get(LATEST_CHANGE_COL)),
        });
    }

    Ok(DailySnapshot::new(trade_date, records))
}

/// Plain stock list for touched-limit-up and limit-down queries.
pub fn adapt_listing(rows: &[RawRow]) -> Result<Vec<ListedStock>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let stock_code = required_text(row, CODE_COL, idx)?;
        if !seen.insert(stock_code.clone()) {
            continue;
        }
        out.push(ListedStock {
            stock_code,
            stock_name: to_text(row.get(NAME_COL)).unwrap_or_default(),
            latest_change_pct: to_number(row.get(LATEST_CHANGE_COL)),
        });
    }
    Ok(out)
}

/// Industry-board bars. Numbers are coerced leniently; bars without a board name or a
/// parseable date are skipped.
pub fn adapt_sector_bars(rows: &[RawRow]) -> Vec<SectorBar> {
    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let Some(board_name) = to_text(row.get(BOARD_NAME_COL)).filter(|s| !s.is_empty()) else {
            tracing::warn!(idx, "board row without name; skipping");
            continue;
        };
        let Some(date) = to_text(row.get(BOARD_DATE_COL)).and_then(|s| parse_date(&s)) else {
            tracing::warn!(idx, %board_name, "board row without date; skipping");
            continue;
        };

        out.push(SectorBar {
            board_name,
            date,
            open: to_number(row.get("开盘")),
            close: to_number(row.get("收盘")),
            high: to_number(row.get("最高")),
            low: to_number(row.get("最低")),
            volume: to_number(row.get("成交量")),
            amount: to_number(row.get("成交额")),
            amplitude: to_number(row.get("振幅")),
            change_pct: to_number(row.get("涨跌幅")),
            turnover: to_number(row.get("换手率")),
        });
    }
    out
}

fn required_text(row: &RawRow, col: &str, idx: usize) -> Result<String> {
    let v = to_text(row.get(col)).filter(|s| !s.is_empty());
    v.ok_or_else(|| anyhow::anyhow!("row {idx} is missing required column {col}"))
}

fn to_text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers, numeric strings and `"3.2%"` style strings; anything else is absent.
fn to_number(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let t = s.trim().trim_end_matches('%').trim();
            if t.is_empty() {
                return None;
            }
            t.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// Whole positive day counts only; `1.5` or `0` is unusable.
fn to_streak(v: Option<&Value>) -> Option<u32> {
    let d = to_number(v)?;
    if d < 1.0 || d.fract() != 0.0 || d > f64::from(u32::MAX) {
        return None;
    }
    Some(d as u32)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let t = s.trim();
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(t, "%Y%m%d"))
        .ok()
        .or_else(|| {
            // Timestamps such as "2025-03-07 00:00:00".
            t.get(..10)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(v: Value) -> Vec<RawRow> {
        serde_json::from_value(v).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    #[test]
    fn maps_date_suffixed_columns() {
        let rows = rows(json!([
            {
                "股票代码": "300001.SZ",
                "股票简称": "特锐德",
                "连续涨停天数[20250307]": 2,
                "涨停原因类别[20250307]": "AI+芯片",
                "最新涨跌幅": "10.01"
            },
            {
                "股票代码": "600001.SH",
                "股票简称": "邯郸钢铁",
                "连续涨停天数[20250307]": "1",
                "涨停原因类别[20250307]": null
            }
        ]));

        let snap = adapt_limit_up(&rows, date()).unwrap();
        assert_eq!(snap.trade_date, Some(date()));
        assert_eq!(snap.len(), 2);

        let a = &snap.records[0];
        assert_eq!(a.consecutive_limit_days, 2);
        assert_eq!(a.limit_reason_tags, vec!["AI", "芯片"]);
        assert_eq!(a.latest_change_pct, Some(10.01));

        let b = &snap.records[1];
        assert_eq!(b.consecutive_limit_days, 1);
        assert!(b.limit_reason_tags.is_empty());
        assert_eq!(b.reason_label(), UNKNOWN_TAG);
    }

    #[test]
    fn missing_reason_column_becomes_unknown() {
        let rows = rows(json!([
            {"股票代码": "000001", "股票简称": "平安银行", "连续涨停天数[20250307]": 1}
        ]));
        let snap = adapt_limit_up(&rows, date()).unwrap();
        assert_eq!(snap.records[0].limit_reason_tags, vec![UNKNOWN_TAG]);
    }

    #[test]
    fn falls_back_to_bare_column_names() {
        let rows = rows(json!([
            {"股票代码": "000001", "股票简称": "平安银行", "连续涨停天数": 3, "涨停原因类别": "银行"}
        ]));
        let snap = adapt_limit_up(&rows, date()).unwrap();
        assert_eq!(snap.records[0].consecutive_limit_days, 3);
        assert_eq!(snap.records[0].limit_reason_tags, vec!["银行"]);
    }

    #[test]
    fn skips_rows_without_days_and_duplicates() {
        let rows = rows(json!([
            {"股票代码": "000001", "连续涨停天数[20250307]": 1},
            {"股票代码": "000001", "连续涨停天数[20250307]": 2},
            {"股票代码": "000002", "连续涨停天数[20250307]": "--"},
            {"股票代码": "000003"}
        ]));
        let snap = adapt_limit_up(&rows, date()).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.records[0].consecutive_limit_days, 1);
    }

    #[test]
    fn skips_fractional_and_out_of_range_streaks() {
        let rows = rows(json!([
            {"股票代码": "000001", "连续涨停天数[20250307]": "1.5"},
            {"股票代码": "000002", "连续涨停天数[20250307]": 2.5},
            {"股票代码": "000003", "连续涨停天数[20250307]": 0},
            {"股票代码": "000004", "连续涨停天数[20250307]": 1e12},
            {"股票代码": "000005", "连续涨停天数[20250307]": "3.0"}
        ]));
        let snap = adapt_limit_up(&rows, date()).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.records[0].stock_code, "000005");
        assert_eq!(snap.records[0].consecutive_limit_days, 3);
    }

    #[test]
    fn missing_code_is_an_error() {
        let rows = rows(json!([{"股票简称": "无代码", "连续涨停天数[20250307]": 1}]));
        assert!(adapt_limit_up(&rows, date()).is_err());
        assert!(adapt_listing(&rows).is_err());
    }

    #[test]
    fn empty_rows_give_empty_snapshot() {
        let snap = adapt_limit_up(&[], date()).unwrap();
        assert!(snap.is_empty());
        assert!(adapt_listing(&[]).unwrap().is_empty());
    }

    #[test]
    fn coerces_board_numbers_leniently() {
        let rows = rows(json!([
            {"板块名称": "半导体", "日期": "2025-03-07", "涨跌幅": "1.25%", "换手率": 2.5, "成交额": "3.5e9", "成交量": "-"},
            {"板块名称": "银行", "日期": "20250306", "涨跌幅": null},
            {"板块名称": "无日期", "涨跌幅": 1.0},
            {"日期": "2025-03-07", "涨跌幅": 1.0}
        ]));
        let bars = adapt_sector_bars(&rows);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].change_pct, Some(1.25));
        assert_eq!(bars[0].turnover, Some(2.5));
        assert_eq!(bars[0].amount, Some(3.5e9));
        assert_eq!(bars[0].volume, None);
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2025, 3, 6).unwrap());
        assert_eq!(bars[1].change_pct, None);
    }
}
