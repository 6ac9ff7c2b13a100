use crate::domain::concepts::{compare_concepts, concept_counts, ConceptChange};
use crate::domain::ladder::{build_ladder, LadderRow};
use crate::domain::promotion::{self, PromotionCase, PromotionRate, PromotionResult};
use crate::domain::sentiment::{LimitCounts, SentimentMetrics};
use crate::domain::snapshot::{DailySnapshot, ListedStock};
use chrono::NaiveDate;
use serde::Serialize;

/// Everything one trade date's analysis reads, already adapted to the typed schema.
#[derive(Debug, Clone)]
pub struct DashboardInputs {
    pub selected_date: NaiveDate,
    pub previous_date: NaiveDate,
    pub selected: DailySnapshot,
    pub previous: DailySnapshot,
    pub touched: Vec<ListedStock>,
    pub selected_limit_down: Vec<ListedStock>,
    pub previous_limit_down: Vec<ListedStock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionPanel {
    pub label: String,
    pub rate: PromotionRate,
    pub total: usize,
    pub success_count: usize,
    pub progress: f64,
    pub cases: Vec<PromotionCase>,
}

impl From<&PromotionResult> for PromotionPanel {
    fn from(r: &PromotionResult) -> Self {
        Self {
            label: r.label(),
            rate: r.rate,
            total: r.total,
            success_count: r.success_count(),
            progress: r.progress(),
            cases: r.cases(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub selected_date: NaiveDate,
    pub previous_date: NaiveDate,
    pub sentiment: SentimentMetrics,
    pub counts: LimitCounts,
    pub concepts: Vec<ConceptChange>,
    pub ladder: Vec<LadderRow>,
    /// Only tiers whose cohort is non-empty.
    pub promotion: Vec<PromotionPanel>,
}

pub fn build_dashboard(inputs: &DashboardInputs) -> Dashboard {
    let sentiment = SentimentMetrics::compute(&inputs.previous, &inputs.selected, &inputs.touched);
    let counts = LimitCounts::new(
        inputs.previous.len(),
        inputs.previous_limit_down.len(),
        inputs.selected.len(),
        inputs.selected_limit_down.len(),
    );
    let concepts = compare_concepts(
        &concept_counts(&inputs.selected),
        &concept_counts(&inputs.previous),
    );
    let results = promotion::compute(&inputs.previous, &inputs.selected);

    Dashboard {
        selected_date: inputs.selected_date,
        previous_date: inputs.previous_date,
        sentiment,
        counts,
        concepts,
        ladder: build_ladder(&inputs.selected),
        promotion: promotion::visible_tiers(&results)
            .map(PromotionPanel::from)
            .collect(),
    }
}
