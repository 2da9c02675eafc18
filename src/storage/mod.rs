//! Snapshot persistence.
//!
//! Every entity is stored under a key derived from its type, so distinct
//! courses are diffed independently of each other.
//!
//! ## Directory Structure
//!
//! ```text
//! data/
//! ├── final-grades.json       # Final grades of every semester
//! ├── exception.json          # Entities of an unrecognized type
//! ├── compared.json           # Change sets of the last run
//! └── courses/
//!     ├── 28-inf-s-doli.json  # One results tree per course
//!     └── 28-inf-s-algo.json
//! ```

pub mod local;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::models::{COURSE_RESULTS_TREE, ComparedReport, Entity, FINAL_GRADES, Record};

// Re-export for convenience
pub use local::LocalSnapshotStore;

/// Location of one entity's snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    FinalGrades,
    Course(String),
    Exception,
}

impl StorageKey {
    /// Derive the storage key for an entity.
    ///
    /// Course trees are keyed by the lowercased group of their first item.
    pub fn for_entity(entity: &Entity) -> Self {
        match entity.declared_type() {
            Some(FINAL_GRADES) => Self::FinalGrades,
            Some(COURSE_RESULTS_TREE) => match entity.items.first() {
                Some(first) => Self::Course(sanitize(&first.group.to_lowercase())),
                None => Self::Exception,
            },
            _ => Self::Exception,
        }
    }

    /// Parse a key as printed by [`fmt::Display`] (`courses/<group>`).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_end_matches(".json");
        match s {
            "final-grades" => Some(Self::FinalGrades),
            "exception" => Some(Self::Exception),
            _ => s
                .strip_prefix("courses/")
                .filter(|group| !group.is_empty())
                .map(|group| Self::Course(sanitize(&group.to_lowercase()))),
        }
    }

    /// Path of the snapshot relative to the data directory.
    pub fn relative_path(&self) -> PathBuf {
        match self {
            Self::FinalGrades => PathBuf::from("final-grades.json"),
            Self::Course(group) => PathBuf::from("courses").join(format!("{group}.json")),
            Self::Exception => PathBuf::from("exception.json"),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FinalGrades => write!(f, "final-grades"),
            Self::Course(group) => write!(f, "courses/{group}"),
            Self::Exception => write!(f, "exception"),
        }
    }
}

/// Keep a group usable as a single file name.
fn sanitize(group: &str) -> String {
    group
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A previously persisted entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// `None` for legacy snapshots stored as a bare array
    pub entity_type: Option<String>,
    pub items: Vec<Record>,
}

impl Snapshot {
    /// View the snapshot as an entity; legacy snapshots get a blank type.
    pub fn into_entity(self) -> Entity {
        Entity::new(self.entity_type.unwrap_or_default(), self.items)
    }
}

/// On-disk shapes a snapshot file may have.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum StoredSnapshot {
    Entity(Entity),
    Legacy(Vec<Record>),
}

impl From<StoredSnapshot> for Snapshot {
    fn from(stored: StoredSnapshot) -> Self {
        match stored {
            StoredSnapshot::Entity(entity) => Snapshot {
                entity_type: entity.declared_type().map(str::to_string),
                items: entity.items,
            },
            StoredSnapshot::Legacy(items) => Snapshot {
                entity_type: None,
                items,
            },
        }
    }
}

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot at `key`; `Ok(None)` when nothing was stored yet.
    async fn load(&self, key: &StorageKey) -> Result<Option<Snapshot>>;

    /// Overwrite the snapshot at `key` with `entity`.
    async fn save(&self, key: &StorageKey, entity: &Entity) -> Result<()>;

    /// Persist the change sets of a finished comparison.
    async fn save_report(&self, report: &ComparedReport) -> Result<()>;
}
