// src/services/browser.rs

//! Browser collaborator.
//!
//! The crawler and the extractors only need three things from a browser:
//! load a URL, look at what was rendered, and fill in a form. `HttpBrowser`
//! provides that over a cookie-keeping HTTP session, which is enough for the
//! server-rendered portal pages.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::utils::resolve_url;

/// How to find an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    Name(String),
    Class(String),
    /// Anchor whose trimmed text equals the given text
    LinkText(String),
    /// Form holding a field with the given name
    FormWithField(String),
    Css(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn class(class: impl Into<String>) -> Self {
        Self::Class(class.into())
    }

    pub fn link_text(text: impl Into<String>) -> Self {
        Self::LinkText(text.into())
    }

    pub fn form_with_field(name: impl Into<String>) -> Self {
        Self::FormWithField(name.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    fn selector_source(&self) -> String {
        match self {
            Self::Id(id) => format!("[id=\"{id}\"]"),
            Self::Name(name) => format!("[name=\"{name}\"]"),
            Self::Class(class) => format!("[class~=\"{class}\"]"),
            Self::LinkText(_) => "a".to_string(),
            Self::FormWithField(_) => "form".to_string(),
            Self::Css(css) => css.clone(),
        }
    }

    fn selector(&self) -> Result<Selector> {
        let source = self.selector_source();
        Selector::parse(&source).map_err(|e| AppError::selector(&source, format!("{e:?}")))
    }

    fn accepts(&self, element: &ElementRef<'_>) -> bool {
        match self {
            Self::LinkText(text) => element_text(element).trim() == text.trim(),
            Self::FormWithField(name) => element
                .descendants()
                .filter_map(ElementRef::wrap)
                .any(|el| el.value().attr("name") == Some(name.as_str())),
            _ => true,
        }
    }
}

/// Owned snapshot of an element found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub text: String,
    pub inner_html: String,
    pub attributes: HashMap<String, String>,
}

impl Element {
    fn from_ref(element: &ElementRef<'_>) -> Self {
        Self {
            tag: element.value().name().to_string(),
            text: element_text(element),
            inner_html: element.inner_html(),
            attributes: element
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect()
}

/// Find every element matching `locator` in an HTML document.
pub fn find_all_in(source: &str, locator: &Locator) -> Result<Vec<Element>> {
    let selector = locator.selector()?;
    let document = Html::parse_document(source);
    Ok(document
        .select(&selector)
        .filter(|el| locator.accepts(el))
        .map(|el| Element::from_ref(&el))
        .collect())
}

/// Find the first element matching `locator` in an HTML document.
pub fn find_in(source: &str, locator: &Locator) -> Result<Option<Element>> {
    Ok(find_all_in(source, locator)?.into_iter().next())
}

/// A form ready to be submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedForm {
    pub method: String,
    pub action: String,
    pub fields: Vec<(String, String)>,
}

/// Collect the current values of a form and apply `overrides`.
///
/// Unchecked checkboxes/radios and buttons are left out; overrides replace
/// existing fields of the same name or are appended.
pub fn prepare_form(
    source: &str,
    page_url: &Url,
    form: &Locator,
    overrides: &[(String, String)],
) -> Result<PreparedForm> {
    let form_selector = form.selector()?;
    let input_selector = Locator::css("input[name], select[name], textarea[name]").selector()?;
    let document = Html::parse_document(source);

    let form_el = document
        .select(&form_selector)
        .find(|el| form.accepts(el))
        .ok_or_else(|| AppError::browser("submit_form", format!("form {form:?} not found")))?;

    let mut fields: Vec<(String, String)> = Vec::new();
    for input in form_el.select(&input_selector) {
        let value = input.value();
        let Some(name) = value.attr("name") else {
            continue;
        };
        let kind = value.attr("type").unwrap_or("text").to_ascii_lowercase();
        match kind.as_str() {
            "submit" | "button" | "image" | "reset" | "file" => continue,
            "checkbox" | "radio" if value.attr("checked").is_none() => continue,
            _ => {}
        }
        let current = if value.name() == "textarea" {
            element_text(&input)
        } else {
            value.attr("value").unwrap_or_default().to_string()
        };
        fields.push((name.to_string(), current));
    }

    for (name, new_value) in overrides {
        match fields.iter_mut().find(|(n, _)| n == name) {
            Some(field) => field.1 = new_value.clone(),
            None => fields.push((name.clone(), new_value.clone())),
        }
    }

    let action = form_el
        .value()
        .attr("action")
        .filter(|a| !a.trim().is_empty())
        .map(|a| resolve_url(page_url, a))
        .unwrap_or_else(|| page_url.to_string());
    let method = form_el
        .value()
        .attr("method")
        .unwrap_or("get")
        .to_ascii_uppercase();

    Ok(PreparedForm {
        method,
        action,
        fields,
    })
}

/// Capability to obtain rendered portal pages.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Load `url`, replacing the current page.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// URL of the current page after redirects.
    fn current_url(&self) -> Option<&str>;

    /// Raw HTML of the current page.
    fn page_source(&self) -> Result<&str>;

    /// Submit the form found by `form`, overriding the given fields.
    async fn submit_form(&mut self, form: &Locator, fields: &[(String, String)]) -> Result<()>;

    /// Terminate the session.
    async fn quit(&mut self) -> Result<()>;

    /// Parsed HTML of the current page.
    fn document(&self) -> Result<Html> {
        Ok(Html::parse_document(self.page_source()?))
    }

    fn find_element(&self, locator: &Locator) -> Result<Option<Element>> {
        find_in(self.page_source()?, locator)
    }

    fn find_elements(&self, locator: &Locator) -> Result<Vec<Element>> {
        find_all_in(self.page_source()?, locator)
    }
}

#[derive(Debug)]
struct LoadedPage {
    url: Url,
    source: String,
}

/// Browser backed by a cookie-keeping HTTP client.
pub struct HttpBrowser {
    client: Client,
    page: Option<LoadedPage>,
    closed: bool,
}

impl HttpBrowser {
    /// Create a session; failing to build the client is fatal for a run.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        log::info!("Creating new HTTP browser session");
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            page: None,
            closed: false,
        })
    }

    fn ensure_open(&self, context: &str) -> Result<()> {
        if self.closed {
            return Err(AppError::browser(context, "session has been terminated"));
        }
        Ok(())
    }

    async fn load(&mut self, request: reqwest::RequestBuilder) -> Result<()> {
        let response = request.send().await?.error_for_status()?;
        let url = response.url().clone();
        let source = response.text().await?;
        log::debug!("Loaded '{}' ({} bytes)", url, source.len());
        self.page = Some(LoadedPage { url, source });
        Ok(())
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.ensure_open("navigate")?;
        log::debug!("Navigating to '{url}'");
        let request = self.client.get(url);
        self.load(request).await
    }

    fn current_url(&self) -> Option<&str> {
        self.page.as_ref().map(|p| p.url.as_str())
    }

    fn page_source(&self) -> Result<&str> {
        self.page
            .as_ref()
            .map(|p| p.source.as_str())
            .ok_or_else(|| AppError::browser("page_source", "no page loaded"))
    }

    async fn submit_form(&mut self, form: &Locator, fields: &[(String, String)]) -> Result<()> {
        self.ensure_open("submit_form")?;
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| AppError::browser("submit_form", "no page loaded"))?;
        let prepared = prepare_form(&page.source, &page.url, form, fields)?;
        log::debug!("Submitting form to '{}'", prepared.action);

        let method = Method::from_bytes(prepared.method.as_bytes())
            .map_err(|e| AppError::browser("submit_form", e))?;
        let request = if method == Method::GET {
            self.client.get(&prepared.action).query(&prepared.fields)
        } else {
            self.client.request(method, &prepared.action).form(&prepared.fields)
        };
        self.load(request).await
    }

    async fn quit(&mut self) -> Result<()> {
        log::info!("Terminating the browser session");
        self.page = None;
        self.closed = true;
        Ok(())
    }
}
