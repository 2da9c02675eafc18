// src/pipeline/crawl.rs

//! Destination queue crawl.
//!
//! The crawler walks an append-only queue of root-relative destinations.
//! Extractors may discover more destinations while it runs; every
//! destination is visited at most once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::diff::DataController;
use crate::services::auth::Authenticator;
use crate::services::browser::Browser;
use crate::services::extractors::{ExtractorOutput, ExtractorRegistry};
use crate::utils::url::{DestinationNormalizer, extractor_key};

/// Counters of a finished crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub visited: usize,
    /// Destinations skipped because the session was not signed in
    pub skipped: usize,
    /// Navigation or extraction failures
    pub failed: usize,
    /// Pages an extractor returned data for
    pub extracted: usize,
    pub discovered: usize,
    pub entities_submitted: usize,
}

pub struct Crawler {
    browser: Box<dyn Browser>,
    auth: Box<dyn Authenticator>,
    registry: ExtractorRegistry,
    normalizer: DestinationNormalizer,
    request_delay: Duration,
    failed_pages_dir: Option<PathBuf>,
    queue: Vec<String>,
    cursor: usize,
    visited: Vec<String>,
}

impl Crawler {
    /// Create a crawler seeded with the configured destinations.
    pub fn new(
        config: &Config,
        browser: Box<dyn Browser>,
        auth: Box<dyn Authenticator>,
        registry: ExtractorRegistry,
    ) -> Result<Self> {
        let normalizer =
            DestinationNormalizer::new(&config.portal.root_url, &config.crawler.tracking_params)?;

        let mut crawler = Self {
            browser,
            auth,
            registry,
            normalizer,
            request_delay: Duration::from_millis(config.crawler.request_delay_ms),
            failed_pages_dir: config
                .crawler
                .save_failed_pages
                .then(|| Path::new(&config.storage.data_dir).join("exceptions")),
            queue: Vec::new(),
            cursor: 0,
            visited: Vec::new(),
        };
        for destination in &config.crawler.destinations {
            crawler.enqueue(destination);
        }
        Ok(crawler)
    }

    /// Add a destination unless it was visited or is already waiting.
    pub fn enqueue(&mut self, destination: &str) -> bool {
        let destination = self.normalizer.normalize(destination);
        if self.visited.contains(&destination) || self.queue[self.cursor..].contains(&destination)
        {
            log::debug!("Destination '{destination}' already known, not enqueued");
            return false;
        }
        log::debug!("Enqueued '{destination}'");
        self.queue.push(destination);
        true
    }

    /// Every destination ever enqueued, in order.
    pub fn queue(&self) -> &[String] {
        &self.queue
    }

    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    /// Process the queue until it is exhausted, then end the browser session.
    ///
    /// The session is ended on error as well. Scraped entities are submitted
    /// to `data`; analysis is left to the caller.
    pub async fn run(&mut self, data: &mut DataController) -> Result<CrawlSummary> {
        let mut summary = CrawlSummary::default();
        let outcome = self.crawl(data, &mut summary).await;

        if let Err(e) = self.browser.quit().await {
            log::error!("Browser session could not be terminated: {e}");
        }
        outcome.map(|()| summary)
    }

    async fn crawl(
        &mut self,
        data: &mut DataController,
        summary: &mut CrawlSummary,
    ) -> Result<()> {
        let mut navigated = false;

        while self.cursor < self.queue.len() {
            let destination = self.queue[self.cursor].clone();
            self.cursor += 1;

            log::info!("Processing destination '{destination}'");
            self.visited.push(destination.clone());
            summary.visited += 1;

            if !self.auth.is_authenticated(self.browser.as_mut()).await? {
                log::warn!("Not signed in, skipping '{destination}'");
                summary.skipped += 1;
                continue;
            }

            if navigated && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            navigated = true;

            let url = self.normalizer.absolute(&destination);
            if let Err(e) = self.browser.navigate(&url).await {
                log::error!("Navigation to '{url}' failed: {e}");
                summary.failed += 1;
                continue;
            }

            match self.extract(&destination) {
                Ok(Some(output)) => {
                    summary.extracted += 1;
                    self.route(output, data, summary);
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("Extraction failed on '{destination}': {e:?}");
                    summary.failed += 1;
                    self.save_failed_page(&destination).await;
                }
            }
        }

        log::info!("Destination queue exhausted after {} page(s)", summary.visited);
        Ok(())
    }

    /// Keep the current page source for troubleshooting; failures are only logged.
    async fn save_failed_page(&self, destination: &str) {
        let Some(dir) = &self.failed_pages_dir else {
            return;
        };
        let source = match self.browser.page_source() {
            Ok(source) => source.to_string(),
            Err(e) => {
                log::warn!("No page source to keep for '{destination}': {e}");
                return;
            }
        };

        let file = format!(
            "exception-{}-{}.html",
            Local::now().format("%d-%m-%y"),
            extractor_key(destination)
        );
        let path = dir.join(file);
        let written = match tokio::fs::create_dir_all(dir).await {
            Ok(()) => tokio::fs::write(&path, source).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => log::info!("Page source of '{destination}' saved as {}", path.display()),
            Err(e) => log::error!("Could not save page source to {}: {e}", path.display()),
        }
    }

    /// Run the extractor registered for `destination` on the current page.
    fn extract(&self, destination: &str) -> Result<Option<ExtractorOutput>> {
        let key = extractor_key(destination);
        let Some(extractor) = self.registry.resolve(&key) else {
            log::info!("No extractor registered for '{key}'");
            return Ok(None);
        };

        log::debug!("Running extractor {}", extractor.name());
        let output = extractor.get_data(self.browser.as_ref())?;
        Ok(output.filter(|o| !o.is_empty()))
    }

    fn route(
        &mut self,
        output: ExtractorOutput,
        data: &mut DataController,
        summary: &mut CrawlSummary,
    ) {
        for destination in &output.new_destinations {
            if self.enqueue(destination) {
                summary.discovered += 1;
            }
        }
        summary.entities_submitted += output.parsed_results.len();
        data.submit_all(output.parsed_results);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::AnalysisConfig;
    use crate::storage::LocalSnapshotStore;
    use crate::testing::{FailingAuth, RecordingNotifier, ScriptedBrowser, StaticAuth};
    use tempfile::TempDir;

    const ROOT: &str = "https://usos.example.com/kontroler.php?_action=";
    const INDEX: &str = "dla_stud/studia/sprawdziany/index";
    const COURSE: &str = "dla_stud/studia/sprawdziany/pokaz&wez_id=55";

    const INDEX_PAGE: &str = r#"<table id="lista">
        <tr><td><a class="fwdlink" href="https://usos.example.com/kontroler.php?_action=dla_stud/studia/sprawdziany/pokaz&amp;wez_id=55">Logika</a></td></tr>
        <tr><td><a class="fwdlink" href="https://usos.example.com/kontroler.php?_action=dla_stud/studia/sprawdziany/pokaz&amp;wez_id=55#top">Logika</a></td></tr>
        <tr><td><a class="fwdlink" href="https://usos.example.com/kontroler.php?_action=dla_stud/studia/sprawdziany/index">Odśwież</a></td></tr>
    </table>"#;

    const COURSE_PAGE: &str = r#"<div id="layout-c22a">
        <h1><span><a>Logika</a> <span>28-INF-S-DOLI</span></span></h1>
        <div id="drzewo"><div id="r">
            <table><tr><td></td><td>Egzamin</td><td>5</td></tr></table>
        </div></div>
    </div>"#;

    fn config(destinations: &[&str]) -> Config {
        let mut config = Config::default();
        config.portal.root_url = ROOT.to_string();
        config.crawler.destinations = destinations.iter().map(|d| d.to_string()).collect();
        config.crawler.request_delay_ms = 0;
        config.crawler.save_failed_pages = false;
        config
    }

    fn controller(dir: &TempDir) -> DataController {
        DataController::new(
            Box::new(LocalSnapshotStore::new(dir.path())),
            Box::new(RecordingNotifier::default()),
            &AnalysisConfig::default(),
        )
    }

    fn url(destination: &str) -> String {
        format!("{ROOT}{destination}")
    }

    #[test]
    fn test_seed_drops_duplicates() {
        let crawler = Crawler::new(
            &config(&[INDEX, INDEX, url(INDEX).as_str()]),
            Box::new(ScriptedBrowser::new()),
            Box::new(StaticAuth(true)),
            ExtractorRegistry::default(),
        )
        .unwrap();
        assert_eq!(crawler.queue(), &[INDEX.to_string()]);
        assert!(crawler.visited().is_empty());
    }

    #[tokio::test]
    async fn test_rediscovered_destinations_are_not_requeued() {
        let dir = TempDir::new().unwrap();
        let browser = ScriptedBrowser::new()
            .page(&url(INDEX), INDEX_PAGE)
            .page(&url(COURSE), COURSE_PAGE);
        let log = browser.log_handle();
        let mut crawler = Crawler::new(
            &config(&[INDEX]),
            Box::new(browser),
            Box::new(StaticAuth(true)),
            ExtractorRegistry::default(),
        )
        .unwrap();
        let mut data = controller(&dir);

        let summary = crawler.run(&mut data).await.unwrap();

        assert_eq!(crawler.queue(), &[INDEX.to_string(), COURSE.to_string()]);
        assert_eq!(crawler.visited(), crawler.queue());
        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.entities_submitted, 1);
        assert_eq!(data.buffered(), 1);
        assert_eq!(log.lock().unwrap().quits, 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_visit_is_noop() {
        let dir = TempDir::new().unwrap();
        let browser = ScriptedBrowser::new().page(&url("dla_stud/plan"), "<p>plan</p>");
        let mut crawler = Crawler::new(
            &config(&["dla_stud/plan"]),
            Box::new(browser),
            Box::new(StaticAuth(true)),
            ExtractorRegistry::default(),
        )
        .unwrap();
        crawler.run(&mut controller(&dir)).await.unwrap();

        let before = crawler.queue().len();
        assert!(!crawler.enqueue("dla_stud/plan"));
        assert_eq!(crawler.queue().len(), before);
    }

    #[tokio::test]
    async fn test_unknown_extractor_is_noop() {
        let dir = TempDir::new().unwrap();
        let browser = ScriptedBrowser::new().page(&url("dla_stud/plan"), "<p>plan</p>");
        let mut crawler = Crawler::new(
            &config(&["dla_stud/plan"]),
            Box::new(browser),
            Box::new(StaticAuth(true)),
            ExtractorRegistry::default(),
        )
        .unwrap();
        let mut data = controller(&dir);

        let summary = crawler.run(&mut data).await.unwrap();
        assert_eq!(summary.visited, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.extracted, 0);
        assert_eq!(data.buffered(), 0);
    }

    #[tokio::test]
    async fn test_extractor_failure_does_not_stop_crawl() {
        let dir = TempDir::new().unwrap();
        let grades = "dla_stud/studia/oceny/index";
        let browser = ScriptedBrowser::new()
            .page(&url(grades), "<p>no table here</p>")
            .page(&url(COURSE), COURSE_PAGE);
        let mut crawler = Crawler::new(
            &config(&[grades, COURSE]),
            Box::new(browser),
            Box::new(StaticAuth(true)),
            ExtractorRegistry::default(),
        )
        .unwrap();
        let mut data = controller(&dir);

        let summary = crawler.run(&mut data).await.unwrap();
        assert_eq!(summary.visited, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(data.buffered(), 1);
    }

    #[tokio::test]
    async fn test_navigation_failure_does_not_stop_crawl() {
        let dir = TempDir::new().unwrap();
        let browser = ScriptedBrowser::new().page(&url(COURSE), COURSE_PAGE);
        let log = browser.log_handle();
        let mut crawler = Crawler::new(
            &config(&["dla_stud/missing", COURSE]),
            Box::new(browser),
            Box::new(StaticAuth(true)),
            ExtractorRegistry::default(),
        )
        .unwrap();
        let mut data = controller(&dir);

        let summary = crawler.run(&mut data).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(data.buffered(), 1);
        assert_eq!(log.lock().unwrap().navigations.len(), 2);
    }

    #[tokio::test]
    async fn test_unauthenticated_destination_is_skipped() {
        let dir = TempDir::new().unwrap();
        let browser = ScriptedBrowser::new().page(&url(COURSE), COURSE_PAGE);
        let log = browser.log_handle();
        let mut crawler = Crawler::new(
            &config(&[COURSE]),
            Box::new(browser),
            Box::new(StaticAuth(false)),
            ExtractorRegistry::default(),
        )
        .unwrap();
        let mut data = controller(&dir);

        let summary = crawler.run(&mut data).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(data.buffered(), 0);

        let log = log.lock().unwrap();
        assert!(log.navigations.is_empty());
        assert_eq!(log.quits, 1);
    }

    #[tokio::test]
    async fn test_authentication_error_is_fatal() {
        let dir = TempDir::new().unwrap();
        let browser = ScriptedBrowser::new();
        let log = browser.log_handle();
        let mut crawler = Crawler::new(
            &config(&[COURSE]),
            Box::new(browser),
            Box::new(FailingAuth),
            ExtractorRegistry::default(),
        )
        .unwrap();

        let result = crawler.run(&mut controller(&dir)).await;
        assert!(matches!(result, Err(AppError::Auth(_))));
        assert_eq!(log.lock().unwrap().quits, 1);
    }

    #[tokio::test]
    async fn test_failed_page_source_is_kept() {
        let dir = TempDir::new().unwrap();
        let grades = "dla_stud/studia/oceny/index";
        let browser = ScriptedBrowser::new().page(&url(grades), "<p>no table here</p>");
        let mut config = config(&[grades]);
        config.storage.data_dir = dir.path().display().to_string();
        config.crawler.save_failed_pages = true;
        let mut crawler = Crawler::new(
            &config,
            Box::new(browser),
            Box::new(StaticAuth(true)),
            ExtractorRegistry::default(),
        )
        .unwrap();

        let summary = crawler.run(&mut controller(&dir)).await.unwrap();
        assert_eq!(summary.failed, 1);

        let saved: Vec<_> = std::fs::read_dir(dir.path().join("exceptions"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(saved.len(), 1);
        let name = saved[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("exception-"));
        assert!(name.ends_with("-dla_stud-studia-oceny-index.html"));
        assert_eq!(std::fs::read_to_string(&saved[0]).unwrap(), "<p>no table here</p>");
    }
}
