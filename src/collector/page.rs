//! Single page collectors (cms, category, product)

use std::sync::Arc;

use async_trait::async_trait;

use super::{collect_modules, finish, open_page, visit, Collector, CollectorError, FlowOptions};
use crate::browser::{Browser, Page};
use crate::config::{BundleDefinition, ModuleMap};

/// Visits one URL and records every module it loads
pub struct PageCollector {
    name: String,
    url: String,
    options: Arc<FlowOptions>,
}

impl PageCollector {
    pub fn new(name: impl Into<String>, url: impl Into<String>, options: Arc<FlowOptions>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            options,
        }
    }

    async fn run(&self, page: &mut dyn Page) -> Result<ModuleMap, CollectorError> {
        visit(page, &self.url).await?;
        collect_modules(page, &self.options).await
    }
}

#[async_trait]
impl Collector for PageCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, browser: &dyn Browser) -> Result<BundleDefinition, CollectorError> {
        let mut page = open_page(browser, &self.options).await?;

        let outcome = self.run(page.as_mut()).await;
        let modules = finish(page.as_mut(), outcome).await?;

        Ok(BundleDefinition {
            name: self.name.clone(),
            modules,
        })
    }
}
