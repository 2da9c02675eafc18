//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::ChangeSet;
use crate::services::auth::Authenticator;
use crate::services::browser::{Browser, Locator, prepare_form};
use crate::services::notify::Notifier;

/// What a [`ScriptedBrowser`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct BrowserLog {
    pub navigations: Vec<String>,
    pub submissions: Vec<Vec<(String, String)>>,
    pub quits: usize,
}

/// Browser serving canned pages by URL.
#[derive(Default)]
pub struct ScriptedBrowser {
    pages: HashMap<String, String>,
    after_submit: Option<(String, String)>,
    current: Option<(String, String)>,
    log: Arc<Mutex<BrowserLog>>,
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` whenever `url` is loaded.
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// After a form submission land on `url`, which from then on serves `html`.
    pub fn after_submit(mut self, url: &str, html: &str) -> Self {
        self.after_submit = Some((url.to_string(), html.to_string()));
        self
    }

    /// Make `url` the current page without recording a navigation.
    pub fn show(&mut self, url: &str) {
        let html = self.pages.get(url).cloned().unwrap_or_default();
        self.current = Some((url.to_string(), html));
    }

    pub fn log(&self) -> BrowserLog {
        self.log.lock().unwrap().clone()
    }

    /// Shared handle, still readable after the browser was boxed away.
    pub fn log_handle(&self) -> Arc<Mutex<BrowserLog>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        match self.pages.get(url) {
            Some(html) => {
                self.current = Some((url.to_string(), html.clone()));
                Ok(())
            }
            None => Err(AppError::browser("navigate", format!("no page scripted for {url}"))),
        }
    }

    fn current_url(&self) -> Option<&str> {
        self.current.as_ref().map(|(url, _)| url.as_str())
    }

    fn page_source(&self) -> Result<&str> {
        self.current
            .as_ref()
            .map(|(_, html)| html.as_str())
            .ok_or_else(|| AppError::browser("page_source", "no page loaded"))
    }

    async fn submit_form(&mut self, form: &Locator, fields: &[(String, String)]) -> Result<()> {
        let (url, html) = self
            .current
            .as_ref()
            .ok_or_else(|| AppError::browser("submit_form", "no page loaded"))?;
        let page_url = Url::parse(url)?;
        let prepared = prepare_form(html, &page_url, form, fields)?;
        self.log.lock().unwrap().submissions.push(prepared.fields);

        if let Some((url, html)) = self.after_submit.clone() {
            self.pages.insert(url.clone(), html.clone());
            self.current = Some((url, html));
        }
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        self.log.lock().unwrap().quits += 1;
        self.current = None;
        Ok(())
    }
}

/// Authenticator with a fixed answer.
pub struct StaticAuth(pub bool);

#[async_trait]
impl Authenticator for StaticAuth {
    async fn is_authenticated(&mut self, _browser: &mut dyn Browser) -> Result<bool> {
        Ok(self.0)
    }
}

/// Authenticator that always errors.
pub struct FailingAuth;

#[async_trait]
impl Authenticator for FailingAuth {
    async fn is_authenticated(&mut self, _browser: &mut dyn Browser) -> Result<bool> {
        Err(AppError::auth("portal unreachable"))
    }
}

/// Notifier keeping every batch it was handed.
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<Vec<ChangeSet>>>>,
}

impl RecordingNotifier {
    pub fn batches(&self) -> Vec<Vec<ChangeSet>> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, changes: &[ChangeSet]) -> Result<bool> {
        self.sent.lock().unwrap().push(changes.to_vec());
        Ok(true)
    }
}
