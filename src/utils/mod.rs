//! Utility functions and helpers.

pub mod log;
pub mod url;

use ::url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a URL string against a base URL string.
pub fn resolve(base_url: &str, href: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .map(|base| resolve_url(&base, href))
}

/// Collapse newlines and whitespace runs of a table cell into single spaces.
pub fn clean_cell(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
