//! Generate command implementation

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::browser::{CdpBrowser, Credentials};
use crate::collector::{collect_all, default_collectors, FlowOptions, OptionResolver, StorefrontUrls};
use crate::config::{save_definitions, Settings};

/// Collect bundle definitions from a running storefront
#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// CMS page URL (usually the home page)
    #[arg(long)]
    pub cms_url: Option<String>,

    /// Category page URL
    #[arg(long)]
    pub category_url: Option<String>,

    /// Product page URL, also the start of the checkout flow
    #[arg(long)]
    pub product_url: Option<String>,

    /// HTTP basic auth username
    #[arg(short = 'u', long)]
    pub auth_username: Option<String>,

    /// HTTP basic auth password
    #[arg(short = 'p', long, requires = "auth_username")]
    pub auth_password: Option<String>,

    /// Script holding a function that selects product options
    #[arg(long)]
    pub option_resolver: Option<PathBuf>,

    /// Do not walk the cart and checkout pages
    #[arg(long)]
    pub skip_checkout: bool,

    /// Where to write the bundle definitions
    #[arg(short, long, default_value = "localebundle.config.json")]
    pub output: PathBuf,
}

impl GenerateCommand {
    pub async fn execute(&self, settings: Settings) -> Result<()> {
        let start = Instant::now();

        let urls = StorefrontUrls {
            cms: self.cms_url.clone(),
            category: self.category_url.clone(),
            product: self.product_url.clone(),
            checkout: !self.skip_checkout,
        };
        if urls.cms.is_none() && urls.category.is_none() && urls.product.is_none() {
            bail!("At least one of --cms-url, --category-url or --product-url is required");
        }

        let credentials = self.auth_username.as_ref().map(|username| Credentials {
            username: username.clone(),
            password: self.auth_password.clone().unwrap_or_default(),
        });
        let options = FlowOptions::new(credentials, &settings.generate.exclude)?;

        let resolver = match &self.option_resolver {
            Some(path) => OptionResolver::Script(settings.resolve(path)),
            None => OptionResolver::Default,
        };

        let collectors = default_collectors(&urls, resolver, options);

        info!("Launching browser");
        let browser = CdpBrowser::launch(&settings.browser)
            .await
            .context("Failed to launch browser")?;

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
        spinner.set_message("Collecting modules...");
        spinner.enable_steady_tick(Duration::from_millis(120));

        let collected = collect_all(&browser, &collectors).await;

        spinner.finish_and_clear();
        browser.close().await?;

        let definitions = collected?;
        let output = settings.resolve(&self.output);
        save_definitions(&output, &definitions)?;

        for definition in &definitions {
            eprintln!(
                "  {} {} ({} modules)",
                "•".dimmed(),
                definition.name.cyan(),
                definition.modules.len()
            );
        }

        eprintln!(
            "\n{} Wrote {} in {:.2}s\n",
            "✓".green().bold(),
            output.display().to_string().cyan(),
            start.elapsed().as_secs_f64()
        );

        Ok(())
    }
}
