use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

const BEIJING_OFFSET_SECS: i32 = 8 * 3600;

// SSE/SZSE close at 15:00 Beijing time; provider data settles a little later.
const CLOSE_CUTOFF_HOUR_CST: u32 = 15;
const CLOSE_CUTOFF_MINUTE_CST: u32 = 30;

// First SSE session.
const FIRST_SESSION: (i32, u32, u32) = (1990, 12, 19);

pub fn first_session() -> NaiveDate {
    let (y, m, d) = FIRST_SESSION;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// A-share trading days: weekdays that are not exchange holidays.
#[derive(Debug, Clone, Default)]
pub struct TradingCalendar {
    holidays: HashSet<NaiveDate>,
}

impl TradingCalendar {
    pub fn with_holidays(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Fixed-date closures plus `CN_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD"`.
    pub fn from_env() -> Self {
        let mut holidays = fixed_holidays();
        if let Ok(s) = std::env::var("CN_MARKET_HOLIDAYS") {
            holidays.extend(parse_holiday_list(&s));
        }
        Self { holidays }
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        date >= first_session() && !is_weekend(date) && !self.holidays.contains(&date)
    }

    /// Latest trading day strictly before `date`. Fails for the first session and
    /// anything earlier.
    pub fn previous_trading_day(&self, date: NaiveDate) -> anyhow::Result<NaiveDate> {
        self.trading_day_on_or_before(date.pred_opt())
            .with_context(|| format!("no A-share trading day before {date}"))
    }

    pub fn ensure_trading_day(&self, date: NaiveDate) -> anyhow::Result<()> {
        anyhow::ensure!(
            date >= first_session(),
            "{date} is before the first A-share session ({})",
            first_session()
        );
        anyhow::ensure!(
            self.is_trading_day(date),
            "{date} is not an A-share trading day"
        );
        Ok(())
    }

    fn trading_day_on_or_before(&self, date: Option<NaiveDate>) -> Option<NaiveDate> {
        let first = first_session();
        let mut cur = date?;
        while cur >= first {
            if self.is_trading_day(cur) {
                return Some(cur);
            }
            cur = cur.pred_opt()?;
        }
        None
    }

    /// Explicit `YYYY-MM-DD` dates must be past-or-present trading days. Without one,
    /// the latest session that has closed (Beijing time) is used.
    pub fn resolve_trade_date(
        &self,
        trade_date_arg: Option<&str>,
        now_utc: DateTime<Utc>,
    ) -> anyhow::Result<NaiveDate> {
        let cst = chrono::FixedOffset::east_opt(BEIJING_OFFSET_SECS).context("invalid CST offset")?;
        let now_cst = now_utc.with_timezone(&cst);

        if let Some(s) = trade_date_arg {
            let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .with_context(|| format!("invalid trade date {s:?}, expected YYYY-MM-DD"))?;
            anyhow::ensure!(
                date <= now_cst.date_naive(),
                "trade date {date} is in the future"
            );
            self.ensure_trading_day(date)?;
            return Ok(date);
        }

        let cutoff_reached =
            (now_cst.hour(), now_cst.minute()) >= (CLOSE_CUTOFF_HOUR_CST, CLOSE_CUTOFF_MINUTE_CST);
        let today = now_cst.date_naive();
        let start = if cutoff_reached { Some(today) } else { today.pred_opt() };

        self.trading_day_on_or_before(start)
            .with_context(|| format!("no closed A-share session on or before {today}"))
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn fixed_holidays() -> HashSet<NaiveDate> {
    // Solar-calendar closures only. Spring Festival, Qingming, Dragon Boat and
    // Mid-Autumn move every year and come from CN_MARKET_HOLIDAYS.
    let mut out = HashSet::new();
    for y in 2024..=2030 {
        let fixed = [(1, 1), (5, 1), (5, 2), (5, 3)]
            .into_iter()
            .chain((1..=7).map(|d| (10, d)));
        for (m, d) in fixed {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }
    out
}

fn parse_holiday_list(s: &str) -> Vec<NaiveDate> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d").ok())
        .collect()
}
