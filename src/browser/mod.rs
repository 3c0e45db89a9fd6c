//! Browser automation seam
//!
//! Collectors drive pages through the [`Browser`] and [`Page`] traits only.
//! [`CdpBrowser`] implements them over the Chrome DevTools Protocol.

mod cdp;
mod launch;
mod network;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use cdp::{CdpBrowser, CdpPage};
pub use network::NetworkTracker;

/// Errors raised by the browser layer
#[derive(Error, Debug)]
pub enum BrowserError {
    /// No usable browser executable
    #[error("No Chromium/Chrome executable found{}. Set [browser] executable in localebundle.toml.", .0.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default())]
    NotFound(Option<String>),

    /// Browser process failed to start
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    /// WebSocket transport failure
    #[error("DevTools connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    /// Protocol command rejected
    #[error("DevTools command {method} failed: {message}")]
    Protocol { method: String, message: String },

    /// Page script threw
    #[error("Page script failed: {0}")]
    Script(String),

    /// Navigation could not complete
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// Connection closed underneath us
    #[error("Browser connection closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Basic auth credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Outcome of a settled navigation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    /// HTTP status of the main document, when one was observed
    pub status: Option<u16>,
}

impl Navigation {
    /// Whether the server refused our credentials
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self.status, Some(401 | 403))
    }
}

/// A browser able to open isolated pages
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a page in a fresh, isolated session
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError>;
}

/// One page of a browser session.
///
/// Navigation methods return once the network has settled: the load event
/// fired and no request was in flight for a short quiet window.
#[async_trait]
pub trait Page: Send {
    /// Answer HTTP auth challenges with these credentials
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), BrowserError>;

    /// Navigate and wait for the network to settle
    async fn goto(&mut self, url: &str) -> Result<Navigation, BrowserError>;

    /// Evaluate an expression, returning its JSON value. Promises are awaited.
    async fn evaluate(&mut self, expression: &str) -> Result<Value, BrowserError>;

    /// Evaluate an expression that triggers a navigation, then wait for it to settle
    async fn evaluate_and_wait_for_navigation(
        &mut self,
        expression: &str,
    ) -> Result<Navigation, BrowserError>;

    /// Close the page and its session
    async fn close(&mut self) -> Result<(), BrowserError>;
}
