// src/utils/url.rs

//! Destination normalization and extractor key resolution.

use regex::Regex;

use crate::error::Result;

/// Rewrites links found on portal pages into root-relative destinations.
#[derive(Debug, Clone)]
pub struct DestinationNormalizer {
    root_url: String,
    tracking: Vec<Regex>,
}

impl DestinationNormalizer {
    /// Build a normalizer; `tracking_params` are regexes over parameter names.
    pub fn new(root_url: impl Into<String>, tracking_params: &[String]) -> Result<Self> {
        let tracking = tracking_params
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            root_url: root_url.into(),
            tracking,
        })
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// Full URL of a normalized destination.
    pub fn absolute(&self, destination: &str) -> String {
        format!("{}{}", self.root_url, destination)
    }

    /// Translate a link into a root-relative destination.
    ///
    /// Absolute URLs outside the root are returned unchanged.
    pub fn normalize(&self, destination: &str) -> String {
        let trimmed = destination.trim();
        let mut destination = if trimmed.starts_with("http://") || trimmed.starts_with("https://")
        {
            match trimmed.strip_prefix(self.root_url.as_str()) {
                Some(relative) => {
                    log::debug!("Destination '{trimmed}' normalized into '{relative}'");
                    relative.to_string()
                }
                None => {
                    log::error!("Normalizing url '{trimmed}' has failed: no rule has been set");
                    return trimmed.to_string();
                }
            }
        } else {
            trimmed.to_string()
        };

        if let Some(idx) = destination.find('#') {
            destination.truncate(idx);
        }
        self.strip_tracking(&destination)
    }

    /// Drop trailing query parameters whose names match a tracking pattern.
    fn strip_tracking(&self, destination: &str) -> String {
        if self.tracking.is_empty() {
            return destination.to_string();
        }

        let mut parts: Vec<&str> = destination.split('&').collect();
        while parts.len() > 1 {
            let last = parts[parts.len() - 1];
            let name = last.split('=').next().unwrap_or(last);
            if self.tracking.iter().any(|re| re.is_match(name)) {
                parts.pop();
            } else {
                break;
            }
        }
        parts.join("&")
    }
}

/// Map a destination to the key its extractor is registered under.
///
/// Path separators become `-` and everything from the first query
/// delimiter (`&` or `?`) on is dropped.
///
/// # Examples
/// ```
/// use gradewatch::utils::url::extractor_key;
///
/// assert_eq!(extractor_key("studia/sprawdziany/pokaz?id=55"), "studia-sprawdziany-pokaz");
/// ```
pub fn extractor_key(destination: &str) -> String {
    let end = destination.find(['&', '?']).unwrap_or(destination.len());
    destination[..end].replace('/', "-")
}
