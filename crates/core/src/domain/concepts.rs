use crate::domain::snapshot::DailySnapshot;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptCount {
    pub concept: String,
    pub count: usize,
}

/// Day-over-day row of the concept table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptChange {
    pub concept: String,
    pub selected: usize,
    pub previous: usize,
    pub change: i64,
}

/// Counts every tag across the snapshot, most frequent first (ties by tag).
pub fn concept_counts(snapshot: &DailySnapshot) -> Vec<ConceptCount> {
    count_tags(
        snapshot
            .records
            .iter()
            .flat_map(|r| r.limit_reason_tags.iter().map(String::as_str)),
    )
}

/// Frequency table over raw `+`-joined tag strings.
pub fn tag_frequency<'a, I>(raw_tags: I) -> Vec<ConceptCount>
where
    I: IntoIterator<Item = &'a str>,
{
    count_tags(raw_tags.into_iter().flat_map(|raw| {
        raw.split(crate::domain::snapshot::TAG_DELIMITER)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }))
}

fn count_tags<'a>(tags: impl Iterator<Item = &'a str>) -> Vec<ConceptCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in tags {
        *counts.entry(tag).or_default() += 1;
    }

    let mut out: Vec<ConceptCount> = counts
        .into_iter()
        .map(|(concept, count)| ConceptCount {
            concept: concept.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.concept.cmp(&b.concept)));
    out
}

/// Outer-joins both days' counts; a concept absent on one day counts as 0 there.
pub fn compare_concepts(selected: &[ConceptCount], previous: &[ConceptCount]) -> Vec<ConceptChange> {
    let mut merged: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for c in selected {
        merged.entry(c.concept.as_str()).or_default().0 = c.count;
    }
    for c in previous {
        merged.entry(c.concept.as_str()).or_default().1 = c.count;
    }

    let mut out: Vec<ConceptChange> = merged
        .into_iter()
        .map(|(concept, (selected, previous))| ConceptChange {
            concept: concept.to_string(),
            selected,
            previous,
            change: selected as i64 - previous as i64,
        })
        .collect();
    // Stable sort keeps the BTreeMap's concept order among ties.
    out.sort_by(|a, b| b.selected.cmp(&a.selected));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{LimitUpRecord, UNKNOWN_TAG};

    fn as_map(counts: &[ConceptCount]) -> HashMap<&str, usize> {
        counts.iter().map(|c| (c.concept.as_str(), c.count)).collect()
    }

    #[test]
    fn counts_split_tags() {
        let out = tag_frequency(["AI+芯片", "AI+软件"]);
        let m = as_map(&out);
        assert_eq!(m.len(), 3);
        assert_eq!(m["AI"], 2);
        assert_eq!(m["芯片"], 1);
        assert_eq!(m["软件"], 1);
        assert_eq!(out[0].concept, "AI");
    }

    #[test]
    fn counts_snapshot_records_including_unknown_placeholder() {
        let mut unknown = LimitUpRecord::new("000003", "C", 1, "");
        unknown.limit_reason_tags = vec![UNKNOWN_TAG.to_string()];
        let snapshot = DailySnapshot {
            trade_date: None,
            records: vec![
                LimitUpRecord::new("000001", "A", 1, "机器人+AI"),
                LimitUpRecord::new("000002", "B", 2, "机器人"),
                unknown,
            ],
        };

        let m_out = concept_counts(&snapshot);
        let m = as_map(&m_out);
        assert_eq!(m["机器人"], 2);
        assert_eq!(m["AI"], 1);
        assert_eq!(m[UNKNOWN_TAG], 1);
    }

    #[test]
    fn comparison_fills_missing_with_zero_and_sorts_by_selected() {
        let selected = tag_frequency(["AI+芯片", "AI"]);
        let previous = tag_frequency(["军工", "芯片+芯片"]);

        let out = compare_concepts(&selected, &previous);
        assert_eq!(out[0].concept, "AI");
        assert_eq!((out[0].selected, out[0].previous, out[0].change), (2, 0, 2));

        let chip = out.iter().find(|c| c.concept == "芯片").unwrap();
        assert_eq!((chip.selected, chip.previous, chip.change), (1, 2, -1));

        let last = out.last().unwrap();
        assert_eq!(last.concept, "军工");
        assert_eq!(last.change, -1);
    }
}
