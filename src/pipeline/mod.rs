//! Pipeline entry points.
//!
//! - `Crawler`: walk the destination queue and collect entities
//! - `DataController`: compare entities with stored snapshots and notify
//! - `run_once`: one complete run against the live portal

pub mod crawl;
pub mod diff;
pub mod run;

pub use crawl::{CrawlSummary, Crawler};
pub use diff::{AnalysisReport, ChangeDetector, DataController};
pub use run::{RunOptions, RunReport, run_once, run_with};
