// src/services/notify.rs

//! Change notifications.
//!
//! The [`Dispatcher`] fans one batch of change sets out to every configured
//! channel. Channels are picked by name at startup; each renders the batch
//! to text and delivers it on its own.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::models::{ChangeSet, NotificationConfig};

/// Channel names understood by [`channel_from_name`].
pub const CHANNELS: &[&str] = &["log", "file", "webhook", "email"];

const WEBHOOK_TIMEOUT_SECS: u64 = 30;
const SMTP_TIMEOUT_SECS: u64 = 30;

/// Receives the change sets of a finished analysis.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Dispatch `changes`; `Ok(true)` when every channel delivered.
    async fn send(&self, changes: &[ChangeSet]) -> Result<bool>;
}

/// A single delivery route.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Text of the notification. Empty means there is nothing to send.
    fn render(&self, changes: &[ChangeSet]) -> String;

    async fn deliver(&self, rendered: &str, changes: &[ChangeSet]) -> Result<()>;
}

/// Plain-text report of all changes, or an empty string when there are none.
pub fn render_report(subject: &str, changes: &[ChangeSet]) -> String {
    let total: usize = changes.iter().map(|c| c.items.len()).sum();
    if total == 0 {
        return String::new();
    }

    let mut out = format!(
        "{subject} ({total} change(s), {})\n",
        Local::now().format("%Y-%m-%d %H:%M")
    );
    for set in changes.iter().filter(|c| !c.is_empty()) {
        out.push_str(&format!("\n[{}]\n", set.entity_type));
        for change in &set.items {
            out.push_str("  - ");
            out.push_str(&change.describe());
            out.push('\n');
        }
    }
    out
}

/// Writes the report to the log stream.
pub struct LogChannel {
    subject: String,
}

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    fn render(&self, changes: &[ChangeSet]) -> String {
        render_report(&self.subject, changes)
    }

    async fn deliver(&self, rendered: &str, _changes: &[ChangeSet]) -> Result<()> {
        for line in rendered.lines().filter(|l| !l.trim().is_empty()) {
            log::info!("{line}");
        }
        Ok(())
    }
}

/// Writes the report to a file, replacing earlier contents.
pub struct FileChannel {
    subject: String,
    path: PathBuf,
}

#[async_trait]
impl Channel for FileChannel {
    fn name(&self) -> &'static str {
        "file"
    }

    fn render(&self, changes: &[ChangeSet]) -> String {
        render_report(&self.subject, changes)
    }

    async fn deliver(&self, rendered: &str, _changes: &[ChangeSet]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::notify(self.name(), e))?;
        }
        tokio::fs::write(&self.path, rendered)
            .await
            .map_err(|e| AppError::notify(self.name(), e))?;
        log::info!("Report written to '{}'", self.path.display());
        Ok(())
    }
}

/// POSTs `{text, changes}` as JSON to an HTTP endpoint.
pub struct WebhookChannel {
    subject: String,
    url: String,
    client: Client,
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn render(&self, changes: &[ChangeSet]) -> String {
        render_report(&self.subject, changes)
    }

    async fn deliver(&self, rendered: &str, changes: &[ChangeSet]) -> Result<()> {
        let body = serde_json::json!({
            "text": rendered,
            "changes": changes,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::notify(self.name(), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::notify(self.name(), format!("endpoint answered {status}")));
        }
        Ok(())
    }
}

/// Mails the report as plain text through an SMTP relay.
pub struct EmailChannel {
    subject: String,
    sender: Mailbox,
    recipient: Mailbox,
    host: String,
    port: Option<u16>,
    credentials: Option<SmtpCredentials>,
}

impl EmailChannel {
    fn from_config(config: &NotificationConfig) -> Result<Self> {
        let mailbox = |field: &str, value: &Option<String>| -> Result<Mailbox> {
            let address = value.as_deref().ok_or_else(|| {
                AppError::config(format!(
                    "notifications.{field} is required by the email channel"
                ))
            })?;
            address.parse::<Mailbox>().map_err(|e| {
                AppError::config(format!("notifications.{field} '{address}': {e}"))
            })
        };
        let host = config.smtp_host.clone().ok_or_else(|| {
            AppError::config("notifications.smtp_host is required by the email channel")
        })?;

        let credentials = match (
            std::env::var(&config.smtp_username_env),
            std::env::var(&config.smtp_password_env),
        ) {
            (Ok(user), Ok(password)) => Some(SmtpCredentials::new(user, password)),
            _ => {
                log::debug!("No SMTP credentials in the environment, sending unauthenticated");
                None
            }
        };

        Ok(Self {
            subject: config.subject.clone(),
            sender: mailbox("mail_sender", &config.mail_sender)?,
            recipient: mailbox("mail_recipient", &config.mail_recipient)?,
            host,
            port: config.smtp_port,
            credentials,
        })
    }

    /// The message that [`Channel::deliver`] hands to the relay.
    pub fn build_message(&self, rendered: &str) -> Result<Message> {
        Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(self.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(rendered.to_string())
            .map_err(|e| AppError::notify("email", e))
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn render(&self, changes: &[ChangeSet]) -> String {
        render_report(&self.subject, changes)
    }

    async fn deliver(&self, rendered: &str, _changes: &[ChangeSet]) -> Result<()> {
        let message = self.build_message(rendered)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
            .map_err(|e| AppError::notify(self.name(), e))?
            .timeout(Some(Duration::from_secs(SMTP_TIMEOUT_SECS)));
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(credentials) = &self.credentials {
            builder = builder.credentials(credentials.clone());
        }

        let response = builder
            .build()
            .send(message)
            .await
            .map_err(|e| AppError::notify(self.name(), e))?;
        log::info!("Mail to {} accepted: {}", self.recipient, response.code());
        Ok(())
    }
}

/// Build the channel registered under `name`.
pub fn channel_from_name(name: &str, config: &NotificationConfig) -> Result<Box<dyn Channel>> {
    let subject = config.subject.clone();
    match name {
        "log" => Ok(Box::new(LogChannel { subject })),
        "file" => {
            let path = config.file_path.as_deref().ok_or_else(|| {
                AppError::config("notifications.file_path is required by the file channel")
            })?;
            Ok(Box::new(FileChannel {
                subject,
                path: PathBuf::from(path),
            }))
        }
        "webhook" => {
            let url = config.webhook_url.clone().ok_or_else(|| {
                AppError::config("notifications.webhook_url is required by the webhook channel")
            })?;
            let client = Client::builder()
                .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
                .build()?;
            Ok(Box::new(WebhookChannel {
                subject,
                url,
                client,
            }))
        }
        "email" => Ok(Box::new(EmailChannel::from_config(config)?)),
        other => Err(AppError::config(format!(
            "Unknown notification channel '{other}' (known: {})",
            CHANNELS.join(", ")
        ))),
    }
}

/// Sends a batch to every configured channel.
pub struct Dispatcher {
    enabled: bool,
    channels: Vec<Box<dyn Channel>>,
}

impl Dispatcher {
    pub fn new(enabled: bool, channels: Vec<Box<dyn Channel>>) -> Self {
        Self { enabled, channels }
    }

    /// Resolve the configured channels; an unknown name is a configuration error.
    pub fn from_config(config: &NotificationConfig) -> Result<Self> {
        let channels = config
            .channels
            .iter()
            .map(|name| channel_from_name(name, config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(config.enabled, channels))
    }

    /// Dispatcher that never sends anything.
    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

#[async_trait]
impl Notifier for Dispatcher {
    async fn send(&self, changes: &[ChangeSet]) -> Result<bool> {
        if !self.enabled {
            log::info!("Notifications are disabled, nothing sent");
            return Ok(false);
        }

        log::info!("Preparing dispatcher");
        let mut all_delivered = true;
        for channel in &self.channels {
            let rendered = channel.render(changes);
            if rendered.trim().is_empty() {
                log::error!("Channel {} rendered an empty notification", channel.name());
                all_delivered = false;
                continue;
            }

            log::info!("Sending notifications via {}", channel.name());
            if let Err(e) = channel.deliver(&rendered, changes).await {
                log::error!("Channel {} failed: {e}", channel.name());
                all_delivered = false;
            }
        }
        Ok(all_delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeRecord, Record};
    use tempfile::TempDir;

    fn changes() -> Vec<ChangeSet> {
        vec![ChangeSet::new(
            "final-grades",
            vec![ChangeRecord::updated(
                Record::new("2018/19-Z", "28-INF-S-DOLI", "Logika", vec!["Egzamin: 5".into()]),
                vec!["Egzamin: (brak)".into()],
            )],
        )]
    }

    fn file_config(path: &std::path::Path) -> NotificationConfig {
        NotificationConfig {
            channels: vec!["file".into()],
            file_path: Some(path.display().to_string()),
            ..NotificationConfig::default()
        }
    }

    #[test]
    fn test_render_report() {
        let text = render_report("Grades changed", &changes());
        assert!(text.starts_with("Grades changed (1 change(s)"));
        assert!(text.contains("[final-grades]"));
        assert!(text.contains(
            "  - 2018/19-Z / 28-INF-S-DOLI / Logika: Egzamin: (brak) -> Egzamin: 5"
        ));
    }

    #[test]
    fn test_render_empty_batch() {
        assert!(render_report("x", &[]).is_empty());
        assert!(render_report("x", &[ChangeSet::new("final-grades", vec![])]).is_empty());
    }

    #[test]
    fn test_unknown_channel_is_config_error() {
        let config = NotificationConfig {
            channels: vec!["sms".into()],
            ..NotificationConfig::default()
        };
        let result = Dispatcher::from_config(&config);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_from_config_resolves_channels() {
        let config = NotificationConfig {
            channels: vec!["log".into(), "webhook".into()],
            webhook_url: Some("https://hooks.example.com/x".into()),
            ..NotificationConfig::default()
        };
        let dispatcher = Dispatcher::from_config(&config).unwrap();
        assert_eq!(dispatcher.channel_names(), vec!["log", "webhook"]);
    }

    #[tokio::test]
    async fn test_file_channel_writes_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("report.txt");
        let dispatcher = Dispatcher::from_config(&file_config(&path)).unwrap();

        assert!(dispatcher.send(&changes()).await.unwrap());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("Logika"));
    }

    #[test]
    fn test_enabled_flag_follows_config() {
        assert!(Dispatcher::from_config(&NotificationConfig::default()).unwrap().is_enabled());
        assert!(!Dispatcher::disabled().is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        let config = NotificationConfig {
            enabled: false,
            ..file_config(&path)
        };
        let dispatcher = Dispatcher::from_config(&config).unwrap();

        assert!(!dispatcher.send(&changes()).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_rendering_is_not_delivered() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");
        let dispatcher = Dispatcher::from_config(&file_config(&path)).unwrap();

        assert!(!dispatcher.send(&[]).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failing_channel_is_reported() {
        let dir = TempDir::new().unwrap();
        // The target is a directory, so the write fails.
        let dispatcher = Dispatcher::from_config(&file_config(dir.path())).unwrap();

        assert!(!dispatcher.send(&changes()).await.unwrap());
    }

    fn email_config() -> NotificationConfig {
        NotificationConfig {
            channels: vec!["email".into()],
            mail_sender: Some("Watcher <watcher@example.com>".into()),
            mail_recipient: Some("student@example.com".into()),
            smtp_host: Some("localhost".into()),
            smtp_port: Some(1),
            smtp_username_env: "GRADEWATCH_TEST_UNSET_USER".into(),
            smtp_password_env: "GRADEWATCH_TEST_UNSET_PASS".into(),
            ..NotificationConfig::default()
        }
    }

    #[test]
    fn test_email_message_headers() {
        let channel = EmailChannel::from_config(&email_config()).unwrap();
        let rendered = channel.render(&changes());
        let message = channel.build_message(&rendered).unwrap();

        let text = String::from_utf8(message.formatted()).unwrap();
        assert!(text.contains("Subject: USOSweb: new results"));
        assert!(text.contains("To: student@example.com"));
        assert!(text.contains("watcher@example.com"));
        assert!(text.contains("Content-Type: text/plain; charset=utf-8"));
    }

    #[test]
    fn test_email_requires_addresses() {
        let config = NotificationConfig {
            mail_recipient: None,
            ..email_config()
        };
        assert!(matches!(Dispatcher::from_config(&config), Err(AppError::Config(_))));

        let config = NotificationConfig {
            mail_sender: Some("not an address".into()),
            ..email_config()
        };
        assert!(matches!(Dispatcher::from_config(&config), Err(AppError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_reported() {
        let dispatcher = Dispatcher::from_config(&email_config()).unwrap();
        assert_eq!(dispatcher.channel_names(), vec!["email"]);
        assert!(!dispatcher.send(&changes()).await.unwrap());
    }

    mod webhook {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn config(server: &MockServer) -> NotificationConfig {
            NotificationConfig {
                channels: vec!["webhook".into()],
                webhook_url: Some(format!("{}/hook", server.uri())),
                ..NotificationConfig::default()
            }
        }

        #[tokio::test]
        async fn test_webhook_posts_text_and_changes() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/hook"))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            let dispatcher = Dispatcher::from_config(&config(&server)).unwrap();
            assert!(dispatcher.send(&changes()).await.unwrap());

            let requests = server.received_requests().await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
            assert!(body["text"].as_str().unwrap().starts_with("USOSweb: new results"));
            assert_eq!(body["changes"][0]["entity"], "final-grades");
            assert_eq!(body["changes"][0]["items"][0]["item"], "Logika");
        }

        #[tokio::test]
        async fn test_webhook_error_status_is_failure() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/hook"))
                .respond_with(ResponseTemplate::new(500))
                .mount(&server)
                .await;

            let channel = channel_from_name("webhook", &config(&server)).unwrap();
            let result = channel.deliver("report", &changes()).await;
            assert!(matches!(result, Err(AppError::Notify { .. })));

            let dispatcher = Dispatcher::from_config(&config(&server)).unwrap();
            assert!(!dispatcher.send(&changes()).await.unwrap());
        }
    }
}
