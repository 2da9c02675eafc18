//! Collaborators of the crawl and diff pipeline.
//!
//! - Browser session (`Browser`, `HttpBrowser`)
//! - Portal sign-in (`Authenticator`, `PortalAuthentication`)
//! - Page extractors (`Extractor`, `ExtractorRegistry`)
//! - Change notifications (`Notifier`, `Dispatcher`)

pub mod auth;
pub mod browser;
pub mod extractors;
pub mod notify;

pub use auth::{Authenticator, Credentials, PortalAuthentication};
pub use browser::{Browser, HttpBrowser, Locator};
pub use extractors::{Extractor, ExtractorOutput, ExtractorRegistry};
pub use notify::{Dispatcher, Notifier};
