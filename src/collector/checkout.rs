//! Checkout flow collector
//!
//! Adds a product to the cart, then records modules on the cart and checkout
//! pages. Later pages win when both define the same id.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{
    collect_modules, finish, open_page, visit, Collector, CollectorError, FlowOptions,
    OptionResolver,
};
use crate::browser::{Browser, BrowserError, Page};
use crate::config::{BundleDefinition, ModuleMap};
use crate::utils::merge_right;

pub(crate) const ADD_TO_CART_FORM: &str = "#product_addtocart_form";

pub(crate) const HAS_ADD_TO_CART_FORM: &str =
    "document.querySelector('#product_addtocart_form') !== null";

pub(crate) const SUBMIT_ADD_TO_CART: &str =
    "document.querySelector('#product_addtocart_form').submit()";

pub(crate) const BASE_URL_SCRIPT: &str = "typeof BASE_URL === 'string' ? BASE_URL : null";

/// Flow pages visited after the product is in the cart, relative to the store base URL
const FLOW_PAGES: &[&str] = &["checkout/cart", "checkout"];

/// Collects modules of the cart and checkout pages
pub struct CheckoutCollector {
    product_url: String,
    option_resolver: OptionResolver,
    options: Arc<FlowOptions>,
}

impl CheckoutCollector {
    pub fn new(
        product_url: impl Into<String>,
        option_resolver: OptionResolver,
        options: Arc<FlowOptions>,
    ) -> Self {
        Self {
            product_url: product_url.into(),
            option_resolver,
            options,
        }
    }

    /// Choose product options and submit the add-to-cart form
    async fn add_to_cart(&self, page: &mut dyn Page) -> Result<(), CollectorError> {
        let resolver = self.option_resolver.expression()?;

        page.evaluate(&resolver).await.map_err(|e| match e {
            BrowserError::Script(message) => CollectorError::OptionSelection(message),
            other => other.into(),
        })?;

        if page.evaluate(HAS_ADD_TO_CART_FORM).await? != Value::Bool(true) {
            return Err(CollectorError::MissingElement {
                selector: ADD_TO_CART_FORM.to_string(),
                url: self.product_url.clone(),
            });
        }

        let navigation = page.evaluate_and_wait_for_navigation(SUBMIT_ADD_TO_CART).await?;
        if navigation.is_auth_rejected() {
            return Err(CollectorError::AuthRejected {
                url: self.product_url.clone(),
                status: navigation.status.unwrap_or_default(),
            });
        }

        Ok(())
    }

    /// Walk product, cart and checkout, merging what each stage loaded
    async fn run(&self, page: &mut dyn Page) -> Result<ModuleMap, CollectorError> {
        visit(page, &self.product_url).await?;
        self.add_to_cart(page).await?;

        let base_url = store_base_url(page.evaluate(BASE_URL_SCRIPT).await?)?;

        let mut stages = Vec::with_capacity(FLOW_PAGES.len());
        for step in FLOW_PAGES {
            let url = base_url
                .join(step)
                .map_err(|source| CollectorError::InvalidUrl {
                    url: format!("{}{}", base_url, step),
                    source,
                })?;

            debug!("Visiting {}", url);
            visit(page, url.as_str()).await?;
            stages.push(collect_modules(page, &self.options).await?);
        }

        Ok(merge_right(stages))
    }
}

#[async_trait]
impl Collector for CheckoutCollector {
    fn name(&self) -> &str {
        "checkout"
    }

    async fn collect(&self, browser: &dyn Browser) -> Result<BundleDefinition, CollectorError> {
        let mut page = open_page(browser, &self.options).await?;

        let outcome = self.run(page.as_mut()).await;
        let modules = finish(page.as_mut(), outcome).await?;

        Ok(BundleDefinition {
            name: self.name().to_string(),
            modules,
        })
    }
}

/// Parse the storefront `BASE_URL`, making sure it acts as a directory
fn store_base_url(value: Value) -> Result<Url, CollectorError> {
    let Value::String(mut base) = value else {
        return Err(CollectorError::Malformed("BASE_URL is not defined".to_string()));
    };

    if !base.ends_with('/') {
        base.push('/');
    }

    Url::parse(&base).map_err(|source| CollectorError::InvalidUrl { url: base, source })
}
