//! Snapshot comparison and change dispatch.
//!
//! Scraped entities are buffered during the crawl and analyzed once it is
//! over: every entity is compared with the snapshot stored under its key,
//! the snapshot is replaced, and all detected changes go to the notifier
//! in a single batch.

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{AnalysisConfig, ChangeRecord, ChangeSet, ComparedReport, Entity, NewItemPolicy};
use crate::services::notify::Notifier;
use crate::storage::{Snapshot, SnapshotStore, StorageKey};

/// Compares a freshly scraped entity with its previous snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    new_items: NewItemPolicy,
}

impl ChangeDetector {
    pub fn new(new_items: NewItemPolicy) -> Self {
        Self { new_items }
    }

    /// Changes of `new` relative to `prior`, or `None` when there are none.
    ///
    /// Each new record is matched against the first prior record with the
    /// same identity. Records without a counterpart are handled by the
    /// new-item policy, as is a first run without any typed snapshot.
    pub fn compare(&self, prior: Option<&Snapshot>, new: &Entity) -> Option<ChangeSet> {
        let Some(new_type) = new.declared_type() else {
            log::error!("Scraped entity declares no type, comparison skipped");
            return None;
        };

        let items = match prior {
            Some(prior) if prior.entity_type.as_deref() == Some(new_type) => {
                self.compare_items(prior, new)
            }
            Some(prior) if prior.entity_type.is_some() => {
                log::error!(
                    "Stored entity type '{}' does not match scraped '{new_type}', comparison skipped",
                    prior.entity_type.as_deref().unwrap_or_default()
                );
                Vec::new()
            }
            _ => self.baseline(new_type, new),
        };

        (!items.is_empty()).then(|| ChangeSet::new(new_type, items))
    }

    fn compare_items(&self, prior: &Snapshot, new: &Entity) -> Vec<ChangeRecord> {
        warn_on_duplicates(prior);

        let mut changes = Vec::new();
        for record in &new.items {
            match prior.items.iter().find(|old| old.same_identity(record)) {
                Some(old) if old.values != record.values => {
                    changes.push(ChangeRecord::updated(record.clone(), old.values.clone()));
                }
                Some(_) => {}
                None => match self.new_items {
                    NewItemPolicy::Drop => {
                        log::debug!("New item '{}' joins the baseline", record.item);
                    }
                    NewItemPolicy::Report => changes.push(ChangeRecord::added(record.clone())),
                },
            }
        }
        changes
    }

    fn baseline(&self, entity_type: &str, new: &Entity) -> Vec<ChangeRecord> {
        log::info!(
            "No typed snapshot of '{entity_type}' yet, storing {} item(s) as baseline",
            new.items.len()
        );
        match self.new_items {
            NewItemPolicy::Drop => Vec::new(),
            NewItemPolicy::Report => new.items.iter().cloned().map(ChangeRecord::added).collect(),
        }
    }
}

fn warn_on_duplicates(prior: &Snapshot) {
    let mut seen = HashSet::new();
    let duplicates = prior
        .items
        .iter()
        .filter(|record| !seen.insert(record.identity()))
        .count();
    if duplicates > 0 {
        log::warn!("Stored snapshot holds {duplicates} duplicate identit(ies); first match wins");
    }
}

/// Outcome of [`DataController::analyze`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// Entities with at least one item that went through a comparison
    pub entities_analyzed: usize,
    pub change_sets: Vec<ChangeSet>,
    /// Whether the notifier was called
    pub dispatched: bool,
    /// Whether every notification channel delivered
    pub delivered: bool,
}

impl AnalysisReport {
    pub fn change_count(&self) -> usize {
        self.change_sets.iter().map(|c| c.items.len()).sum()
    }
}

/// Buffers scraped entities and turns them into snapshots and notifications.
pub struct DataController {
    store: Box<dyn SnapshotStore>,
    notifier: Box<dyn Notifier>,
    detector: ChangeDetector,
    save_compared: bool,
    buffer: Vec<Entity>,
}

impl DataController {
    pub fn new(
        store: Box<dyn SnapshotStore>,
        notifier: Box<dyn Notifier>,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            detector: ChangeDetector::new(config.new_items),
            save_compared: config.save_compared,
            buffer: Vec::new(),
        }
    }

    /// Queue one entity for the next analysis.
    pub fn submit(&mut self, entity: Entity) {
        log::debug!(
            "Buffered '{}' entity with {} item(s)",
            entity.entity_type,
            entity.items.len()
        );
        self.buffer.push(entity);
    }

    pub fn submit_all(&mut self, entities: impl IntoIterator<Item = Entity>) {
        for entity in entities {
            self.submit(entity);
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Compare and persist every buffered entity, then dispatch all changes
    /// at once. Drains the buffer.
    pub async fn analyze(&mut self) -> Result<AnalysisReport> {
        let entities = std::mem::take(&mut self.buffer);
        let mut report = AnalysisReport::default();

        for entity in &entities {
            if entity.is_empty() {
                log::debug!("Skipping empty '{}' entity", entity.entity_type);
                continue;
            }
            report.entities_analyzed += 1;
            if let Some(changes) = self.process(entity).await? {
                report.change_sets.push(changes);
            }
        }

        if report.change_sets.is_empty() {
            log::info!("No changes detected in {} entit(ies)", report.entities_analyzed);
        } else {
            log::info!("{} change(s) detected, dispatching", report.change_count());
            report.delivered = self.notifier.send(&report.change_sets).await?;
            report.dispatched = true;
        }

        // Snapshots are already overwritten; the report must not block delivery.
        if self.save_compared {
            let compared = ComparedReport::new(report.change_sets.clone());
            if let Err(e) = self.store.save_report(&compared).await {
                log::error!("Comparison report could not be written: {e}");
            }
        }

        Ok(report)
    }

    /// Load, compare and overwrite the snapshot of one entity.
    async fn process(&self, entity: &Entity) -> Result<Option<ChangeSet>> {
        let key = StorageKey::for_entity(entity);
        let prior = match self.store.load(&key).await {
            Ok(prior) => prior,
            Err(e) => {
                log::error!("Snapshot '{key}' could not be loaded, treating as absent: {e}");
                None
            }
        };

        let changes = self.detector.compare(prior.as_ref(), entity);
        self.store.save(&key, entity).await?;
        Ok(changes)
    }
}
