// src/models/mod.rs

//! Domain models for the grade watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod change;
mod config;
mod record;

// Re-export all public types
pub use change::{ChangeRecord, ChangeSet, ComparedReport};
pub use config::{
    AnalysisConfig, Config, CrawlerConfig, LoggingConfig, NewItemPolicy, NotificationConfig,
    PortalConfig, StorageConfig,
};
pub use record::{COURSE_RESULTS_TREE, Entity, FINAL_GRADES, Identity, Record};
