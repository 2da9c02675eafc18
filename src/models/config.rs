//! Application configuration structures.

use std::fs;
use std::path::Path;

use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Portal address and login page markers
    #[serde(default)]
    pub portal: PortalConfig,

    /// Destination queue and HTTP behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Snapshot storage location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Comparison policy
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Notification channels
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Log verbosity
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Serialize the configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let root = url::Url::parse(&self.portal.root_url)?;
        if !matches!(root.scheme(), "http" | "https") {
            return Err(AppError::validation("portal.root_url must be http(s)"));
        }
        if self.portal.topbar_selector.trim().is_empty() {
            return Err(AppError::validation("portal.topbar_selector is empty"));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.destinations.is_empty() {
            return Err(AppError::validation("No destinations defined"));
        }
        for pattern in &self.crawler.tracking_params {
            regex::Regex::new(pattern)?;
        }
        if self.storage.data_dir.trim().is_empty() {
            return Err(AppError::validation("storage.data_dir is empty"));
        }
        self.notifications.validate()
    }
}

/// Portal address and the page markers used while signing in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Prefix every destination is appended to
    #[serde(default = "defaults::root_url")]
    pub root_url: String,

    /// CSS selector of the top bar cell that shows the signed-in user
    #[serde(default = "defaults::topbar_selector")]
    pub topbar_selector: String,

    /// Text present in the top bar once signed in
    #[serde(default = "defaults::logged_in_marker")]
    pub logged_in_marker: String,

    /// Text of the link that leads to the login form
    #[serde(default = "defaults::login_link_text")]
    pub login_link_text: String,

    /// Environment variable holding the username
    #[serde(default = "defaults::username_env")]
    pub username_env: String,

    /// Environment variable holding the password
    #[serde(default = "defaults::password_env")]
    pub password_env: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            root_url: defaults::root_url(),
            topbar_selector: defaults::topbar_selector(),
            logged_in_marker: defaults::logged_in_marker(),
            login_link_text: defaults::login_link_text(),
            username_env: defaults::username_env(),
            password_env: defaults::password_env(),
        }
    }
}

/// Destination queue and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Destinations the queue starts with
    #[serde(default = "defaults::destinations")]
    pub destinations: Vec<String>,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between navigations in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Query parameter name patterns stripped from discovered links
    #[serde(default = "defaults::tracking_params")]
    pub tracking_params: Vec<String>,

    /// Keep the source of pages an extractor failed on under `<data_dir>/exceptions`
    #[serde(default = "defaults::save_failed_pages")]
    pub save_failed_pages: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            destinations: defaults::destinations(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            tracking_params: defaults::tracking_params(),
            save_failed_pages: defaults::save_failed_pages(),
        }
    }
}

/// Snapshot storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON snapshot per storage key
    #[serde(default = "defaults::data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
        }
    }
}

/// What to do with a record that has no counterpart in the prior snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NewItemPolicy {
    /// Record silently becomes part of the new baseline
    #[default]
    Drop,
    /// Record is reported as a new item
    Report,
}

/// Comparison settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub new_items: NewItemPolicy,

    /// Write the run's change sets to `compared.json`
    #[serde(default = "defaults::save_compared")]
    pub save_compared: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            new_items: NewItemPolicy::default(),
            save_compared: defaults::save_compared(),
        }
    }
}

/// Notification dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Master switch; when off nothing is sent
    #[serde(default = "defaults::notifications_enabled")]
    pub enabled: bool,

    /// Channel names, resolved through the channel registry
    #[serde(default = "defaults::channels")]
    pub channels: Vec<String>,

    /// Target file of the `file` channel
    #[serde(default)]
    pub file_path: Option<String>,

    /// Endpoint of the `webhook` channel
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// `From` mailbox of the `email` channel
    #[serde(default)]
    pub mail_sender: Option<String>,

    /// `To` mailbox of the `email` channel
    #[serde(default)]
    pub mail_recipient: Option<String>,

    /// SMTP relay of the `email` channel
    #[serde(default)]
    pub smtp_host: Option<String>,

    /// SMTP port; the relay default when unset
    #[serde(default)]
    pub smtp_port: Option<u16>,

    /// Environment variable holding the SMTP user name
    #[serde(default = "defaults::smtp_username_env")]
    pub smtp_username_env: String,

    /// Environment variable holding the SMTP password
    #[serde(default = "defaults::smtp_password_env")]
    pub smtp_password_env: String,

    /// Heading placed above rendered reports
    #[serde(default = "defaults::subject")]
    pub subject: String,
}

impl NotificationConfig {
    fn validate(&self) -> Result<()> {
        for channel in &self.channels {
            match channel.as_str() {
                "log" => {}
                "file" if self.file_path.is_none() => {
                    return Err(AppError::validation(
                        "notifications.file_path is required by the file channel",
                    ));
                }
                "file" => {}
                "webhook" => {
                    let url = self.webhook_url.as_deref().ok_or_else(|| {
                        AppError::validation(
                            "notifications.webhook_url is required by the webhook channel",
                        )
                    })?;
                    url::Url::parse(url)?;
                }
                "email" => {
                    for (field, value) in [
                        ("mail_sender", &self.mail_sender),
                        ("mail_recipient", &self.mail_recipient),
                    ] {
                        let address = value.as_deref().ok_or_else(|| {
                            AppError::validation(format!(
                                "notifications.{field} is required by the email channel"
                            ))
                        })?;
                        address.parse::<Mailbox>().map_err(|e| {
                            AppError::validation(format!(
                                "notifications.{field} '{address}' is not a mailbox: {e}"
                            ))
                        })?;
                    }
                    if self.smtp_host.as_deref().is_none_or(|h| h.trim().is_empty()) {
                        return Err(AppError::validation(
                            "notifications.smtp_host is required by the email channel",
                        ));
                    }
                }
                other => {
                    return Err(AppError::validation(format!(
                        "Unknown notification channel '{other}'"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::notifications_enabled(),
            channels: defaults::channels(),
            file_path: None,
            webhook_url: None,
            mail_sender: None,
            mail_recipient: None,
            smtp_host: None,
            smtp_port: None,
            smtp_username_env: defaults::smtp_username_env(),
            smtp_password_env: defaults::smtp_password_env(),
            subject: defaults::subject(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Portal defaults
    pub fn root_url() -> String {
        "https://usosweb.uni.wroc.pl/kontroler.php?_action=".into()
    }
    pub fn topbar_selector() -> String {
        "#casmenu table tr td:nth-child(2)".into()
    }
    pub fn logged_in_marker() -> String {
        "Zalogowany użytkownik:".into()
    }
    pub fn login_link_text() -> String {
        "zaloguj się".into()
    }
    pub fn username_env() -> String {
        "USOS_USER".into()
    }
    pub fn password_env() -> String {
        "USOS_PASS".into()
    }

    // Crawler defaults
    pub fn destinations() -> Vec<String> {
        vec![
            "dla_stud/studia/oceny/index".into(),
            "dla_stud/studia/sprawdziany/index".into(),
        ]
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; gradewatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        250
    }
    pub fn tracking_params() -> Vec<String> {
        vec!["^utm_".into()]
    }
    pub fn save_failed_pages() -> bool {
        true
    }

    // Storage defaults
    pub fn data_dir() -> String {
        "data".into()
    }

    // Analysis defaults
    pub fn save_compared() -> bool {
        true
    }

    // Notification defaults
    pub fn notifications_enabled() -> bool {
        true
    }
    pub fn channels() -> Vec<String> {
        vec!["log".into()]
    }
    pub fn subject() -> String {
        "USOSweb: new results".into()
    }
    pub fn smtp_username_env() -> String {
        "USOS_SMTP_USER".into()
    }
    pub fn smtp_password_env() -> String {
        "USOS_SMTP_PASS".into()
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
}
