//! Tests index page (`dla_stud/studia/sprawdziany/index`).

use scraper::Html;

use super::{Extractor, ExtractorOutput, parse_selector};
use crate::error::{AppError, Result};
use crate::services::browser::Browser;
use crate::utils::resolve;

/// Collects links to the per-course results pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestsIndexExtractor;

impl TestsIndexExtractor {
    pub const KEY: &'static str = "dla_stud-studia-sprawdziany-index";

    pub fn boxed() -> Box<dyn Extractor> {
        Box::new(Self)
    }

    /// Every `.fwdlink` target on a page carrying the `#lista` listing,
    /// resolved against `page_url` when one is known.
    pub fn parse(document: &Html, page_url: Option<&str>) -> Result<Vec<String>> {
        let list_sel = parse_selector("[id=\"lista\"]")?;
        let link_sel = parse_selector("a.fwdlink[href]")?;

        if document.select(&list_sel).next().is_none() {
            return Err(AppError::extract(Self::KEY, "element #lista not found"));
        }

        let destinations: Vec<String> = document
            .select(&link_sel)
            .filter_map(|link| link.value().attr("href"))
            .map(|href| {
                page_url
                    .and_then(|base| resolve(base, href))
                    .unwrap_or_else(|| href.to_string())
            })
            .collect();

        log::debug!("Found {} course result link(s)", destinations.len());
        Ok(destinations)
    }
}

impl Extractor for TestsIndexExtractor {
    fn name(&self) -> &'static str {
        Self::KEY
    }

    fn get_data(&self, browser: &dyn Browser) -> Result<Option<ExtractorOutput>> {
        let document = browser.document()?;
        let destinations = Self::parse(&document, browser.current_url())?;
        Ok(Some(ExtractorOutput::destinations(destinations)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBrowser;

    const URL: &str = "https://usos.example.com/kontroler.php?_action=dla_stud/studia/sprawdziany/index";

    const PAGE: &str = r#"
        <html><body>
        <table id="lista">
          <tr><td><a class="fwdlink" href="kontroler.php?_action=dla_stud/studia/sprawdziany/pokaz&amp;wez_id=55">Logika</a></td></tr>
          <tr><td><a class="fwdlink" href="https://usos.example.com/kontroler.php?_action=dla_stud/studia/sprawdziany/pokaz&amp;wez_id=56">Analiza</a></td></tr>
          <tr><td><a href="kontroler.php?_action=news">News</a></td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_collects_forward_links() {
        let links = TestsIndexExtractor::parse(&Html::parse_document(PAGE), Some(URL)).unwrap();
        assert_eq!(
            links,
            vec![
                "https://usos.example.com/kontroler.php?_action=dla_stud/studia/sprawdziany/pokaz&wez_id=55",
                "https://usos.example.com/kontroler.php?_action=dla_stud/studia/sprawdziany/pokaz&wez_id=56",
            ]
        );
    }

    #[test]
    fn test_without_base_url_keeps_href() {
        let links = TestsIndexExtractor::parse(&Html::parse_document(PAGE), None).unwrap();
        assert_eq!(
            links[0],
            "kontroler.php?_action=dla_stud/studia/sprawdziany/pokaz&wez_id=55"
        );
    }

    #[test]
    fn test_missing_listing_is_error() {
        let result = TestsIndexExtractor::parse(&Html::parse_document("<p>empty</p>"), Some(URL));
        assert!(matches!(result, Err(AppError::Extract { .. })));
    }

    #[test]
    fn test_get_data_returns_only_destinations() {
        let mut browser = ScriptedBrowser::new().page(URL, PAGE);
        browser.show(URL);

        let output = TestsIndexExtractor.get_data(&browser).unwrap().unwrap();
        assert_eq!(output.new_destinations.len(), 2);
        assert!(output.parsed_results.is_empty());
    }
}
