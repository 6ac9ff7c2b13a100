use crate::domain::snapshot::DailySnapshot;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LadderRow {
    pub consecutive_limit_days: u32,
    pub stock_code: String,
    pub stock_name: String,
    pub reason: String,
}

/// Limit-up ladder: highest streak first, then by reason text so related names cluster.
pub fn build_ladder(snapshot: &DailySnapshot) -> Vec<LadderRow> {
    let mut rows: Vec<LadderRow> = snapshot
        .records
        .iter()
        .map(|r| LadderRow {
            consecutive_limit_days: r.consecutive_limit_days,
            stock_code: r.stock_code.clone(),
            stock_name: r.stock_name.clone(),
            reason: r.reason_label(),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.consecutive_limit_days
            .cmp(&a.consecutive_limit_days)
            .then_with(|| a.reason.cmp(&b.reason))
    });
    rows
}
