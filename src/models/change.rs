//! Change records produced by snapshot comparison.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::Record;

/// A scraped record together with the values it replaced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRecord {
    #[serde(flatten)]
    pub record: Record,

    /// Previous values; `None` marks an item with no earlier counterpart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Vec<String>>,
}

impl ChangeRecord {
    /// A record whose values differ from a matching earlier record.
    pub fn updated(record: Record, old_values: Vec<String>) -> Self {
        Self {
            record,
            old_values: Some(old_values),
        }
    }

    /// A record that has no earlier counterpart.
    pub fn added(record: Record) -> Self {
        Self {
            record,
            old_values: None,
        }
    }

    pub fn is_new(&self) -> bool {
        self.old_values.is_none()
    }

    /// One-line description used by notification channels.
    pub fn describe(&self) -> String {
        let r = &self.record;
        let mut label = format!("{} / {}", r.group, r.subgroup);
        if let Some(path) = r.hierarchy.as_deref().filter(|p| !p.is_empty()) {
            label.push_str(" / ");
            label.push_str(path);
        }
        let new = r.values.join(", ");
        match &self.old_values {
            Some(old) => format!("{label} / {}: {} -> {new}", r.item, old.join(", ")),
            None => format!("{label} / {}: {new} (new)", r.item),
        }
    }
}

/// All changes detected for one entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeSet {
    #[serde(rename = "entity")]
    pub entity_type: String,

    pub items: Vec<ChangeRecord>,
}

impl ChangeSet {
    pub fn new(entity_type: impl Into<String>, items: Vec<ChangeRecord>) -> Self {
        Self {
            entity_type: entity_type.into(),
            items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Persisted summary of one run's comparison (`compared.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparedReport {
    pub generated_at: DateTime<Utc>,
    pub change_count: usize,
    pub changes: Vec<ChangeSet>,
}

impl ComparedReport {
    pub fn new(changes: Vec<ChangeSet>) -> Self {
        Self {
            generated_at: Utc::now(),
            change_count: changes.iter().map(|c| c.items.len()).sum(),
            changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_updated_serializes_flat_with_old_values() {
        let record = Record::new("S1", "MATH1", "Algebra", vec!["5.0".into()]);
        let change = ChangeRecord::updated(record, vec!["4.0".into()]);
        let json = serde_json::to_value(&change).unwrap();

        assert_eq!(json["group"], "S1");
        assert_eq!(json["values"][0], "5.0");
        assert_eq!(json["old_values"][0], "4.0");
    }

    #[test]
    fn test_added_has_no_old_values() {
        let change = ChangeRecord::added(Record::new("S1", "M", "A", vec![]));
        assert!(change.is_new());
        let json = serde_json::to_value(&change).unwrap();
        assert!(json.get("old_values").is_none());
    }

    #[test]
    fn test_describe() {
        let record = Record::new("28-INF", "Logic", "Results", vec!["12 pkt".into()])
            .with_hierarchy("Exam");
        let change = ChangeRecord::updated(record, vec!["10 pkt".into()]);
        assert_eq!(
            change.describe(),
            "28-INF / Logic / Exam / Results: 10 pkt -> 12 pkt"
        );

        let fresh = ChangeRecord::added(Record::new("S1", "M", "A", vec!["3.0".into()]));
        assert_eq!(fresh.describe(), "S1 / M / A: 3.0 (new)");
    }

    #[test]
    fn test_compared_report_counts_items() {
        let set = ChangeSet::new(
            "final-grades",
            vec![
                ChangeRecord::added(Record::new("a", "b", "c", vec![])),
                ChangeRecord::added(Record::new("a", "b", "d", vec![])),
            ],
        );
        let report = ComparedReport::new(vec![set]);
        assert_eq!(report.change_count, 2);
    }
}
