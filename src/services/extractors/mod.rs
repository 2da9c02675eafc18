//! Page extractors.
//!
//! One extractor per portal page type, registered under the key its
//! destinations resolve to (see [`crate::utils::url::extractor_key`]).

mod course_results;
mod final_grades;
mod tests_index;

use std::collections::BTreeMap;

use scraper::{ElementRef, Selector};

use crate::error::{AppError, Result};
use crate::models::Entity;
use crate::services::browser::Browser;

pub use course_results::CourseResultsExtractor;
pub use final_grades::FinalGradesExtractor;
pub use tests_index::TestsIndexExtractor;

/// What an extractor found on a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractorOutput {
    /// Links to visit next
    pub new_destinations: Vec<String>,
    /// Entities to hand to the diff engine
    pub parsed_results: Vec<Entity>,
}

impl ExtractorOutput {
    pub fn destinations(new_destinations: Vec<String>) -> Self {
        Self {
            new_destinations,
            ..Self::default()
        }
    }

    pub fn results(parsed_results: Vec<Entity>) -> Self {
        Self {
            parsed_results,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_destinations.is_empty() && self.parsed_results.is_empty()
    }
}

/// Turns the browser's current page into destinations and/or entities.
pub trait Extractor: Send + Sync {
    /// Key this extractor is registered under.
    fn name(&self) -> &'static str;

    /// Scrape the current page. `Ok(None)` means the page carried nothing.
    fn get_data(&self, browser: &dyn Browser) -> Result<Option<ExtractorOutput>>;
}

/// Constructor stored in the registry.
pub type ExtractorFactory = fn() -> Box<dyn Extractor>;

/// Lookup table from extractor key to constructor.
#[derive(Clone)]
pub struct ExtractorRegistry {
    factories: BTreeMap<String, ExtractorFactory>,
}

impl ExtractorRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register `factory` under `key`, replacing any previous entry.
    pub fn register(&mut self, key: impl Into<String>, factory: ExtractorFactory) -> &mut Self {
        self.factories.insert(key.into(), factory);
        self
    }

    /// Build the extractor for `key`, if one is registered.
    pub fn resolve(&self, key: &str) -> Option<Box<dyn Extractor>> {
        self.factories.get(key).map(|factory| factory())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for ExtractorRegistry {
    /// Registry with every portal page type this crate understands.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(FinalGradesExtractor::KEY, FinalGradesExtractor::boxed)
            .register(TestsIndexExtractor::KEY, TestsIndexExtractor::boxed)
            .register(CourseResultsExtractor::KEY, CourseResultsExtractor::boxed);
        registry
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Direct element children of `parent` with the given tag name.
fn child_elements<'a>(parent: ElementRef<'a>, tag: &'a str) -> impl Iterator<Item = ElementRef<'a>> {
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == tag)
}

/// Text of the first descendant matching `selector`.
fn first_text(parent: ElementRef<'_>, selector: &Selector) -> Option<String> {
    parent
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}
