//! Scraped record and entity structures.

use serde::{Deserialize, Serialize};

/// Entity type produced by the final grades page.
pub const FINAL_GRADES: &str = "final-grades";

/// Entity type produced by a single course's results tree.
pub const COURSE_RESULTS_TREE: &str = "course-results-tree";

/// One comparable unit within an entity (a grade row, an assessment entry).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub group: String,

    pub subgroup: String,

    pub item: String,

    /// Path inside a results tree; only set for tree-shaped entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hierarchy: Option<String>,

    #[serde(default)]
    pub values: Vec<String>,
}

/// Borrowed identity key of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity<'a> {
    pub group: &'a str,
    pub subgroup: &'a str,
    pub item: &'a str,
    pub hierarchy: Option<&'a str>,
}

impl Record {
    /// Create a flat record without a hierarchy.
    pub fn new(
        group: impl Into<String>,
        subgroup: impl Into<String>,
        item: impl Into<String>,
        values: Vec<String>,
    ) -> Self {
        Self {
            group: group.into(),
            subgroup: subgroup.into(),
            item: item.into(),
            hierarchy: None,
            values,
        }
    }

    /// Attach a hierarchy path, turning this into a tree record.
    pub fn with_hierarchy(mut self, hierarchy: impl Into<String>) -> Self {
        self.hierarchy = Some(hierarchy.into());
        self
    }

    /// Identity key of this record. `values` never take part in it.
    pub fn identity(&self) -> Identity<'_> {
        Identity {
            group: &self.group,
            subgroup: &self.subgroup,
            item: &self.item,
            hierarchy: self.hierarchy.as_deref(),
        }
    }

    /// Whether both records describe the same logical item.
    ///
    /// When either side carries a hierarchy the other must carry an equal one.
    pub fn same_identity(&self, other: &Record) -> bool {
        self.identity() == other.identity()
    }
}

/// A named, typed batch of records produced by one scrape of one page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    #[serde(rename = "entity")]
    pub entity_type: String,

    #[serde(default)]
    pub items: Vec<Record>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, items: Vec<Record>) -> Self {
        Self {
            entity_type: entity_type.into(),
            items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The declared type, or `None` when the type string is blank.
    pub fn declared_type(&self) -> Option<&str> {
        let trimmed = self.entity_type.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}
