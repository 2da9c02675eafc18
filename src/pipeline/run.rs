// src/pipeline/run.rs

//! One complete watch run: crawl, compare, notify.

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::crawl::{CrawlSummary, Crawler};
use crate::pipeline::diff::{AnalysisReport, DataController};
use crate::services::auth::{Authenticator, Credentials, PortalAuthentication};
use crate::services::browser::{Browser, HttpBrowser};
use crate::services::extractors::ExtractorRegistry;
use crate::services::notify::{Dispatcher, Notifier};
use crate::storage::LocalSnapshotStore;

/// Switches of a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Compare and store snapshots but send no notifications
    pub dry_run: bool,
}

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub crawl: CrawlSummary,
    pub analysis: AnalysisReport,
}

/// Run against the live portal with collaborators built from `config`.
pub async fn run_once(config: &Config, options: RunOptions) -> Result<RunReport> {
    config.validate()?;

    let dispatcher = if options.dry_run {
        log::info!("Dry run: notifications disabled");
        Dispatcher::disabled()
    } else {
        Dispatcher::from_config(&config.notifications)?
    };
    if dispatcher.is_enabled() {
        log::info!("Notification channels: {}", dispatcher.channel_names().join(", "));
    }
    let notifier: Box<dyn Notifier> = Box::new(dispatcher);
    let store = LocalSnapshotStore::new(&config.storage.data_dir);
    let mut data = DataController::new(Box::new(store), notifier, &config.analysis);

    let credentials = Credentials::from_env(&config.portal)?;
    let browser = HttpBrowser::new(&config.crawler)?;
    let auth = PortalAuthentication::new(credentials, config.portal.clone());

    run_with(config, Box::new(browser), Box::new(auth), &mut data).await
}

/// Crawl with the given collaborators, then analyze everything collected.
pub async fn run_with(
    config: &Config,
    browser: Box<dyn Browser>,
    auth: Box<dyn Authenticator>,
    data: &mut DataController,
) -> Result<RunReport> {
    crate::utils::log::header("USOSweb grade watch");

    crate::utils::log::step(1, 2, "Crawling portal destinations");
    let mut crawler = Crawler::new(config, browser, auth, ExtractorRegistry::default())?;
    let crawl = crawler.run(data).await?;

    crate::utils::log::step(2, 2, "Comparing with stored snapshots");
    let analysis = data.analyze().await?;

    crate::utils::log::summary(
        "Run finished",
        &[
            ("Pages visited", crawl.visited.to_string()),
            ("Pages failed", crawl.failed.to_string()),
            ("Entities analyzed", analysis.entities_analyzed.to_string()),
            ("Changes", analysis.change_count().to_string()),
            ("Notified", analysis.dispatched.to_string()),
        ],
    );

    Ok(RunReport { crawl, analysis })
}
