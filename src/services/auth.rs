// src/services/auth.rs

//! Portal sign-in.

use std::fmt;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::PortalConfig;
use crate::services::browser::{Browser, Locator};

/// Gate the crawler passes before every navigation.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Whether the session is signed in, signing in first if needed.
    async fn is_authenticated(&mut self, browser: &mut dyn Browser) -> Result<bool>;
}

/// Username and password of the student account.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read credentials from the environment variables named in the config.
    pub fn from_env(portal: &PortalConfig) -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .map_err(|_| AppError::config(format!("Environment variable {name} is not set")))
        };
        Ok(Self::new(
            read(&portal.username_env)?,
            read(&portal.password_env)?,
        ))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// CAS login flow of the USOSweb portal.
pub struct PortalAuthentication {
    credentials: Credentials,
    portal: PortalConfig,
    authenticated: bool,
}

impl PortalAuthentication {
    pub fn new(credentials: Credentials, portal: PortalConfig) -> Self {
        Self {
            credentials,
            portal,
            authenticated: false,
        }
    }

    async fn sign_in(&mut self, browser: &mut dyn Browser) -> Result<bool> {
        log::info!("Initializing login procedure");
        browser.navigate(&self.portal.root_url).await?;

        if !self.username_in_topbar(browser) {
            match browser.find_element(&Locator::link_text(&self.portal.login_link_text))? {
                Some(link) => match link.attr("href") {
                    Some(href) => {
                        let target = browser
                            .current_url()
                            .and_then(|base| crate::utils::resolve(base, href))
                            .unwrap_or_else(|| href.to_string());
                        browser.navigate(&target).await?;
                        self.perform_login(browser).await?;
                        browser.navigate(&self.portal.root_url).await?;
                    }
                    None => log::error!("Login link has no target"),
                },
                None => log::error!("Login button could not be found"),
            }
        }

        if self.username_in_topbar(browser) {
            self.authenticated = true;
            return Ok(true);
        }
        log::error!("Login procedure did not sign the user in");
        Ok(false)
    }

    async fn perform_login(&self, browser: &mut dyn Browser) -> Result<()> {
        let fields = vec![
            ("username".to_string(), self.credentials.username.clone()),
            ("password".to_string(), self.credentials.password.clone()),
            ("rememberMe".to_string(), "true".to_string()),
        ];

        let form = Locator::form_with_field("password");
        match browser.submit_form(&form, &fields).await {
            Ok(()) => {
                log::info!("Login procedure finished");
                Ok(())
            }
            Err(AppError::Browser { message, .. }) => {
                log::error!("Credentials could not be entered: {message}");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn username_in_topbar(&self, browser: &dyn Browser) -> bool {
        match browser.find_element(&Locator::css(&self.portal.topbar_selector)) {
            Ok(Some(top_bar)) if top_bar.text.contains(&self.portal.logged_in_marker) => {
                log::debug!("Username is present in the top bar");
                true
            }
            Ok(_) => false,
            Err(e) => {
                log::error!("Top bar could not be located: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl Authenticator for PortalAuthentication {
    async fn is_authenticated(&mut self, browser: &mut dyn Browser) -> Result<bool> {
        if self.authenticated {
            log::debug!("User already authenticated");
            return Ok(true);
        }
        log::info!("First authorization");
        self.sign_in(browser).await
    }
}
