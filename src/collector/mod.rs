//! Dynamic module collection
//!
//! Collectors walk a live storefront in a browser and record which modules
//! the AMD loader actually defined on each page. Their output is a
//! [`BundleDefinition`], the same shape a hand written bundle config has.

mod checkout;
mod options;
mod page;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::{debug, info};

use crate::browser::{Browser, BrowserError, Credentials, Page};
use crate::config::{BundleDefinition, ModuleMap};

pub use checkout::CheckoutCollector;
pub use options::OptionResolver;
pub use page::PageCollector;

/// Reads the loader registry of the current page as `[[id, path|null], ...]`
pub(crate) const COLLECT_MODULES_SCRIPT: &str = include_str!("scripts/collect_modules.js");

/// Errors that abort a collector
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Browser layer failure
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// The storefront refused our credentials
    #[error("Authentication rejected by {url} (HTTP {status})")]
    AuthRejected { url: String, status: u16 },

    /// An element the flow depends on is not on the page
    #[error("Element '{selector}' not found on {url}")]
    MissingElement { selector: String, url: String },

    /// Product options could not be chosen
    #[error("Failed to select product options: {0}")]
    OptionSelection(String),

    /// A URL could not be built
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Custom option resolver script unreadable
    #[error("Failed to read option resolver {}: {source}", .path.display())]
    ResolverScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Page returned something the collector cannot interpret
    #[error("Unexpected page response: {0}")]
    Malformed(String),

    /// Module id exclusion pattern failed to compile
    #[error("Invalid module exclusion pattern: {0}")]
    InvalidExclude(#[from] globset::Error),
}

/// Settings shared by every collector of one run
#[derive(Debug, Clone)]
pub struct FlowOptions {
    /// Basic auth for protected storefronts
    pub credentials: Option<Credentials>,

    /// Module ids never recorded
    pub exclude: GlobSet,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            exclude: GlobSet::empty(),
        }
    }
}

impl FlowOptions {
    /// Compile module id exclusion globs
    pub fn new(credentials: Option<Credentials>, exclude: &[String]) -> Result<Self, CollectorError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            credentials,
            exclude: builder.build()?,
        })
    }
}

/// Produces a bundle definition by observing a browser session
#[async_trait]
pub trait Collector: Send + Sync {
    /// Name of the bundle this collector produces
    fn name(&self) -> &str;

    /// Run the flow and return the discovered modules
    async fn collect(&self, browser: &dyn Browser) -> Result<BundleDefinition, CollectorError>;
}

/// Run collectors one after another against a single browser
pub async fn collect_all(
    browser: &dyn Browser,
    collectors: &[Box<dyn Collector>],
) -> Result<Vec<BundleDefinition>, CollectorError> {
    let mut definitions = Vec::with_capacity(collectors.len());

    for collector in collectors {
        info!("Collecting modules for bundle \"{}\"", collector.name());
        let definition = collector.collect(browser).await?;
        info!(
            "Finished collecting modules for bundle \"{}\" ({} modules)",
            definition.name,
            definition.modules.len()
        );
        definitions.push(definition);
    }

    Ok(definitions)
}

/// Open a page and apply credentials
async fn open_page(
    browser: &dyn Browser,
    options: &FlowOptions,
) -> Result<Box<dyn Page>, CollectorError> {
    let mut page = browser.new_page().await?;

    if let Some(credentials) = &options.credentials {
        page.authenticate(credentials).await?;
    }

    Ok(page)
}

/// Close the page whatever the flow's outcome. A flow error wins over a
/// failure to close.
async fn finish<T: Send>(
    page: &mut dyn Page,
    outcome: Result<T, CollectorError>,
) -> Result<T, CollectorError> {
    let closed = page.close().await;

    match outcome {
        Ok(value) => {
            closed?;
            Ok(value)
        }
        Err(e) => {
            if let Err(close_error) = closed {
                debug!("Failed to close page after error: {}", close_error);
            }
            Err(e)
        }
    }
}

/// Navigate and fail on rejected credentials
async fn visit(page: &mut dyn Page, url: &str) -> Result<(), CollectorError> {
    let navigation = page.goto(url).await?;

    if navigation.is_auth_rejected() {
        return Err(CollectorError::AuthRejected {
            url: url.to_string(),
            status: navigation.status.unwrap_or_default(),
        });
    }

    Ok(())
}

/// Read the modules the loader has defined on the settled page
async fn collect_modules(
    page: &mut dyn Page,
    options: &FlowOptions,
) -> Result<ModuleMap, CollectorError> {
    let value = page.evaluate(COLLECT_MODULES_SCRIPT).await?;

    let pairs: Vec<(String, Option<String>)> = serde_json::from_value(value)
        .map_err(|e| CollectorError::Malformed(format!("module list: {}", e)))?;

    let modules: ModuleMap = pairs
        .into_iter()
        .filter(|(id, _)| {
            let excluded = options.exclude.is_match(id);
            if excluded {
                debug!("Excluding module {}", id);
            }
            !excluded
        })
        .collect();

    debug!("Page defines {} modules", modules.len());

    Ok(modules)
}

/// Build the standard collector family from the given storefront URLs
pub fn default_collectors(
    urls: &StorefrontUrls,
    option_resolver: OptionResolver,
    options: FlowOptions,
) -> Vec<Box<dyn Collector>> {
    let options = Arc::new(options);
    let mut collectors: Vec<Box<dyn Collector>> = Vec::new();

    if let Some(url) = &urls.cms {
        collectors.push(Box::new(PageCollector::new("cms", url, options.clone())));
    }
    if let Some(url) = &urls.category {
        collectors.push(Box::new(PageCollector::new("category", url, options.clone())));
    }
    if let Some(url) = &urls.product {
        collectors.push(Box::new(PageCollector::new("product", url, options.clone())));

        if urls.checkout {
            collectors.push(Box::new(CheckoutCollector::new(url, option_resolver, options)));
        }
    }

    collectors
}

/// Storefront entry points to collect from
#[derive(Debug, Clone, Default)]
pub struct StorefrontUrls {
    pub cms: Option<String>,
    pub category: Option<String>,
    pub product: Option<String>,
    /// Also walk product -> cart -> checkout
    pub checkout: bool,
}
