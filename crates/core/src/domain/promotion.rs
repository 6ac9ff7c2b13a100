use crate::domain::snapshot::{DailySnapshot, LimitUpRecord};
use serde::{Serialize, Serializer};
use std::fmt;

/// Promotion rate of one tier. Serializes as the display string (`"1/2=50%"` or `"N/A"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionRate {
    Ratio { success: usize, total: usize },
    NotApplicable,
}

impl PromotionRate {
    fn new(success: usize, total: usize) -> Self {
        if total == 0 {
            return Self::NotApplicable;
        }
        Self::Ratio { success, total }
    }

    pub fn as_fraction(&self) -> Option<f64> {
        match *self {
            Self::Ratio { success, total } => Some(success as f64 / total as f64),
            Self::NotApplicable => None,
        }
    }
}

impl fmt::Display for PromotionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Ratio { success, total } => {
                let pct = success as f64 / total as f64 * 100.0;
                write!(f, "{success}/{total}={pct:.0}%")
            }
            Self::NotApplicable => f.write_str("N/A"),
        }
    }
}

impl Serialize for PromotionRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionResult {
    pub tier: u32,
    pub success_set: Vec<LimitUpRecord>,
    pub fail_set: Vec<LimitUpRecord>,
    pub total: usize,
    pub rate: PromotionRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Success,
    Fail,
}

/// One stock card of a tier panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionCase {
    pub stock_code: String,
    pub stock_name: String,
    pub reason: String,
    pub status: CaseStatus,
}

impl PromotionResult {
    /// `"k进k+1"`, the panel heading used by the dashboard.
    pub fn label(&self) -> String {
        format!("{}进{}", self.tier, self.tier + 1)
    }

    pub fn success_count(&self) -> usize {
        self.success_set.len()
    }

    /// Fill ratio for the progress bar. The success set is not restricted to the
    /// cohort, so the raw ratio can exceed 1.
    pub fn progress(&self) -> f64 {
        self.rate.as_fraction().map(|r| r.min(1.0)).unwrap_or(0.0)
    }

    /// Successes first, then failures, each in snapshot order.
    pub fn cases(&self) -> Vec<PromotionCase> {
        let success = self
            .success_set
            .iter()
            .map(|r| to_case(r, CaseStatus::Success));
        let fail = self.fail_set.iter().map(|r| to_case(r, CaseStatus::Fail));
        success.chain(fail).collect()
    }
}

fn to_case(record: &LimitUpRecord, status: CaseStatus) -> PromotionCase {
    PromotionCase {
        stock_code: record.stock_code.clone(),
        stock_name: record.stock_name.clone(),
        reason: record.reason_label(),
        status,
    }
}

/// Computes per-tier promotion from `earlier` (previous trade date) to `later`.
///
/// An empty `earlier` snapshot has no cohorts and yields no tiers. An empty `later`
/// snapshot is still evaluated: every cohort member counts as failed.
pub fn compute(earlier: &DailySnapshot, later: &DailySnapshot) -> Vec<PromotionResult> {
    if earlier.is_empty() {
        return Vec::new();
    }

    let max_tier = earlier
        .max_consecutive_days()
        .max(later.max_consecutive_days());
    let later_codes = later.codes();

    let mut out = Vec::with_capacity(max_tier as usize);
    for tier in 1..=max_tier {
        let cohort: Vec<&LimitUpRecord> = earlier.with_days(tier).collect();
        let success_set: Vec<LimitUpRecord> = later.with_days(tier + 1).cloned().collect();
        let fail_set: Vec<LimitUpRecord> = cohort
            .iter()
            .filter(|r| !later_codes.contains(r.stock_code.as_str()))
            .map(|r| (*r).clone())
            .collect();

        let total = cohort.len();
        out.push(PromotionResult {
            tier,
            rate: PromotionRate::new(success_set.len(), total),
            success_set,
            fail_set,
            total,
        });
    }

    out
}

/// Tiers worth rendering: those with a non-empty cohort.
pub fn visible_tiers(results: &[PromotionResult]) -> impl Iterator<Item = &PromotionResult> {
    results.iter().filter(|r| r.total > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn rec(code: &str, days: u32) -> LimitUpRecord {
        LimitUpRecord::new(code, format!("Name {code}"), days, "AI")
    }

    fn snap(records: Vec<LimitUpRecord>) -> DailySnapshot {
        DailySnapshot::new(NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(), records)
    }

    fn codes(records: &[LimitUpRecord]) -> Vec<&str> {
        records.iter().map(|r| r.stock_code.as_str()).collect()
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        assert!(compute(&DailySnapshot::empty(), &DailySnapshot::empty()).is_empty());
        assert!(compute(&DailySnapshot::empty(), &snap(vec![rec("A", 2)])).is_empty());
    }

    #[test]
    fn single_stock_promotes() {
        let out = compute(&snap(vec![rec("A", 1)]), &snap(vec![rec("A", 2)]));
        assert_eq!(out.len(), 2);

        let t1 = &out[0];
        assert_eq!(t1.tier, 1);
        assert_eq!(t1.total, 1);
        assert_eq!(codes(&t1.success_set), vec!["A"]);
        assert!(t1.fail_set.is_empty());
        assert_eq!(t1.rate.to_string(), "1/1=100%");
    }

    #[test]
    fn stock_missing_from_later_snapshot_fails() {
        let out = compute(&snap(vec![rec("A", 1)]), &DailySnapshot::empty());
        assert_eq!(out.len(), 1);

        let t1 = &out[0];
        assert_eq!(t1.total, 1);
        assert!(t1.success_set.is_empty());
        assert_eq!(codes(&t1.fail_set), vec!["A"]);
        assert_eq!(t1.rate.to_string(), "0/1=0%");
    }

    #[test]
    fn half_of_cohort_promotes() {
        let out = compute(
            &snap(vec![rec("A", 1), rec("B", 1)]),
            &snap(vec![rec("A", 2)]),
        );
        let t1 = &out[0];
        assert_eq!(t1.total, 2);
        assert_eq!(codes(&t1.success_set), vec!["A"]);
        assert_eq!(codes(&t1.fail_set), vec!["B"]);
        assert_eq!(t1.rate.to_string(), "1/2=50%");
    }

    #[test]
    fn empty_cohort_reports_not_applicable() {
        // Tier 2 has no earlier members but later has a 3-day stock.
        let out = compute(&snap(vec![rec("A", 1)]), &snap(vec![rec("C", 3)]));
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].total, 0);
        assert_eq!(out[1].rate, PromotionRate::NotApplicable);
        assert_eq!(out[1].rate.to_string(), "N/A");
        assert_eq!(codes(&out[1].success_set), vec!["C"]);
        assert_eq!(out[1].progress(), 0.0);
    }

    #[test]
    fn persisting_without_promotion_is_neither_success_nor_fail() {
        // A stays at limit-up but its counter resets (e.g. provider restarted the count).
        let out = compute(&snap(vec![rec("A", 1)]), &snap(vec![rec("A", 1)]));
        assert!(out[0].success_set.is_empty());
        assert!(out[0].fail_set.is_empty());
        assert_eq!(out[0].total, 1);
    }

    #[test]
    fn success_and_fail_sets_are_disjoint() {
        let earlier = snap(vec![rec("A", 1), rec("B", 1), rec("C", 2), rec("D", 2)]);
        let later = snap(vec![rec("A", 2), rec("D", 3), rec("E", 2), rec("B", 1)]);
        for r in compute(&earlier, &later) {
            let s: HashSet<_> = codes(&r.success_set).into_iter().collect();
            let f: HashSet<_> = codes(&r.fail_set).into_iter().collect();
            assert!(s.is_disjoint(&f), "tier {} overlaps", r.tier);
        }
    }

    #[test]
    fn labels_cases_and_visibility() {
        let out = compute(
            &snap(vec![rec("A", 1), rec("B", 1)]),
            &snap(vec![rec("A", 2), rec("X", 4)]),
        );
        assert_eq!(out[0].label(), "1进2");

        let cases = out[0].cases();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].status, CaseStatus::Success);
        assert_eq!(cases[0].stock_code, "A");
        assert_eq!(cases[1].status, CaseStatus::Fail);
        assert_eq!(cases[1].reason, "AI");

        let visible: Vec<u32> = visible_tiers(&out).map(|r| r.tier).collect();
        assert_eq!(visible, vec![1]);
    }

    #[test]
    fn rate_serializes_as_display_string() {
        let out = compute(&snap(vec![rec("A", 1)]), &snap(vec![rec("A", 2)]));
        let v = serde_json::to_value(&out[0]).unwrap();
        assert_eq!(v["rate"], "1/1=100%");
        assert_eq!(v["tier"], 1);
    }
}
