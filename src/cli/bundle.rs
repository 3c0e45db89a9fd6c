//! Bundle command implementation

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::bundler::Bundler;
use crate::config::Settings;
use crate::resolver::parse_exclude_list;

/// Build bundles for every deployed locale
#[derive(Args, Debug)]
pub struct BundleCommand {
    /// Bundle definition file, relative to the project directory
    #[arg(short, long, default_value = "localebundle.config.json")]
    pub bundles: PathBuf,

    /// Comma separated locale paths or globs to skip
    #[arg(short, long)]
    pub exclude_themes: Option<String>,
}

impl BundleCommand {
    pub fn execute(&self, settings: Settings) -> Result<()> {
        let start = Instant::now();

        eprintln!("{} Bundling...", "→".blue());

        let result = Bundler::new(settings, self.into()).build()?;

        let mut current_locale = None;
        for bundle in &result.bundles {
            if current_locale != Some(&bundle.locale) {
                eprintln!("\n{} {}", "•".dimmed(), bundle.locale.cyan());
                current_locale = Some(&bundle.locale);
            }
            eprintln!("  {}", bundle.summary());
        }

        eprintln!(
            "\n{} Built {} bundle(s){} in {:.2}s\n",
            "✓".green().bold(),
            result.bundles.len(),
            if result.minified { " (minified)" } else { "" },
            start.elapsed().as_secs_f64()
        );

        Ok(())
    }
}

/// Bundle options derived from command arguments
#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub bundles: PathBuf,
    pub exclude_themes: Vec<String>,
}

impl From<&BundleCommand> for BundleOptions {
    fn from(cmd: &BundleCommand) -> Self {
        Self {
            bundles: cmd.bundles.clone(),
            exclude_themes: parse_exclude_list(cmd.exclude_themes.as_deref()),
        }
    }
}
