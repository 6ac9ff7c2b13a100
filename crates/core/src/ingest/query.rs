use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Column the provider sorts results by; largest turnover first.
pub const SORT_KEY: &str = "成交金额";
pub const SORT_ORDER: &str = "desc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Non-ST stocks that closed at limit-up.
    LimitUp,
    /// Non-ST stocks that touched limit-up during the session.
    TouchedLimitUp,
    /// Non-ST stocks that closed at limit-down.
    LimitDown,
    /// Daily bars of every industry board.
    IndustryBoards,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LimitUp => "limit_up",
            Self::TouchedLimitUp => "touched_limit_up",
            Self::LimitDown => "limit_down",
            Self::IndustryBoards => "industry_boards",
        }
    }
}

impl std::str::FromStr for QueryKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "limit_up" => Ok(Self::LimitUp),
            "touched_limit_up" => Ok(Self::TouchedLimitUp),
            "limit_down" => Ok(Self::LimitDown),
            "industry_boards" => Ok(Self::IndustryBoards),
            other => anyhow::bail!("unknown query kind: {other}"),
        }
    }
}

/// A provider query: what to select and for which trade date. Doubles as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotQuery {
    pub kind: QueryKind,
    pub trade_date: NaiveDate,
}

impl SnapshotQuery {
    pub fn new(kind: QueryKind, trade_date: NaiveDate) -> Self {
        Self { kind, trade_date }
    }

    pub fn ymd(&self) -> String {
        self.trade_date.format("%Y%m%d").to_string()
    }

    /// Natural-language filter understood by the screening provider.
    pub fn query_text(&self) -> String {
        let ymd = self.ymd();
        match self.kind {
            QueryKind::LimitUp => format!("非ST,{ymd}涨停"),
            QueryKind::TouchedLimitUp => format!("非ST,{ymd}曾涨停"),
            QueryKind::LimitDown => format!("非ST,{ymd}跌停"),
            QueryKind::IndustryBoards => format!("行业板块,{ymd}日线"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_text_embeds_compact_date() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(SnapshotQuery::new(QueryKind::LimitUp, d).query_text(), "非ST,20250307涨停");
        assert_eq!(
            SnapshotQuery::new(QueryKind::TouchedLimitUp, d).query_text(),
            "非ST,20250307曾涨停"
        );
        assert_eq!(SnapshotQuery::new(QueryKind::LimitDown, d).query_text(), "非ST,20250307跌停");
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [
            QueryKind::LimitUp,
            QueryKind::TouchedLimitUp,
            QueryKind::LimitDown,
            QueryKind::IndustryBoards,
        ] {
            assert_eq!(kind.as_str().parse::<QueryKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<QueryKind>().is_err());
    }
}
