//! In-memory browser for collector tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::checkout::{BASE_URL_SCRIPT, HAS_ADD_TO_CART_FORM, SUBMIT_ADD_TO_CART};
use super::COLLECT_MODULES_SCRIPT;
use crate::browser::{Browser, BrowserError, Credentials, Navigation, Page};

/// What a URL serves
#[derive(Debug, Clone)]
pub struct FakePage {
    status: u16,
    modules: Value,
    base_url: Option<String>,
    has_form: bool,
    option_error: Option<String>,
}

impl FakePage {
    pub fn with_modules(modules: &[(&str, Option<&str>)]) -> Self {
        Self::raw_modules(json!(modules))
    }

    pub fn raw_modules(modules: Value) -> Self {
        Self {
            status: 200,
            modules,
            base_url: None,
            has_form: false,
            option_error: None,
        }
    }

    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::with_modules(&[])
        }
    }

    /// Product page with an add-to-cart form
    pub fn product(base_url: &str) -> Self {
        Self {
            base_url: Some(base_url.to_string()),
            has_form: true,
            ..Self::with_modules(&[("catalog", None)])
        }
    }

    pub fn without_form(self) -> Self {
        Self {
            has_form: false,
            ..self
        }
    }

    pub fn option_error(self, message: &str) -> Self {
        Self {
            option_error: Some(message.to_string()),
            ..self
        }
    }
}

#[derive(Debug, Default)]
struct Log {
    visited: Vec<String>,
    authenticated: Vec<Credentials>,
    closed: usize,
}

/// Serves canned pages by URL and records what the collector did
#[derive(Clone, Default)]
pub struct FakeBrowser {
    pages: HashMap<String, FakePage>,
    log: Arc<Mutex<Log>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `page` at `url`, replacing any previous page
    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Navigations in order; form submissions show up as "submit"
    pub fn visited(&self) -> Vec<String> {
        self.log.lock().visited.clone()
    }

    pub fn authenticated(&self) -> Vec<Credentials> {
        self.log.lock().authenticated.clone()
    }

    pub fn closed_pages(&self) -> usize {
        self.log.lock().closed
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        Ok(Box::new(FakeTab {
            browser: self.clone(),
            current: None,
        }))
    }
}

struct FakeTab {
    browser: FakeBrowser,
    current: Option<FakePage>,
}

impl FakeTab {
    fn current(&self) -> Result<&FakePage, BrowserError> {
        self.current
            .as_ref()
            .ok_or_else(|| BrowserError::Script("no page loaded".to_string()))
    }
}

#[async_trait]
impl Page for FakeTab {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), BrowserError> {
        self.browser.log.lock().authenticated.push(credentials.clone());
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<Navigation, BrowserError> {
        let page = self
            .browser
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            })?;

        self.browser.log.lock().visited.push(url.to_string());
        let status = page.status;
        self.current = Some(page);

        Ok(Navigation {
            status: Some(status),
        })
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value, BrowserError> {
        let page = self.current()?;

        match expression {
            COLLECT_MODULES_SCRIPT => Ok(page.modules.clone()),
            BASE_URL_SCRIPT => Ok(json!(page.base_url)),
            HAS_ADD_TO_CART_FORM => Ok(json!(page.has_form)),
            _ => match &page.option_error {
                Some(message) => Err(BrowserError::Script(format!("Error: {}", message))),
                None => Ok(Value::Null),
            },
        }
    }

    async fn evaluate_and_wait_for_navigation(
        &mut self,
        expression: &str,
    ) -> Result<Navigation, BrowserError> {
        assert_eq!(expression, SUBMIT_ADD_TO_CART);
        self.browser.log.lock().visited.push("submit".to_string());
        Ok(Navigation { status: Some(200) })
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.browser.log.lock().closed += 1;
        Ok(())
    }
}
