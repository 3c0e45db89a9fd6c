//! Command-line interface for localebundle
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `bundle`: Build per-locale bundles from a bundle definition file
//! - `generate`: Collect bundle definitions from a live storefront

mod bundle;
mod generate;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::config::Settings;

pub use bundle::{BundleCommand, BundleOptions};
pub use generate::GenerateCommand;

/// Per-locale JavaScript bundles for AMD storefronts
#[derive(Parser, Debug)]
#[command(name = "localebundle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to localebundle.toml settings file, relative to the project directory
    #[arg(short, long, global = true, default_value = "localebundle.toml")]
    pub config: PathBuf,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".", env = "LOCALEBUNDLE_DIR")]
    pub dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build bundles for every deployed locale
    Bundle(BundleCommand),

    /// Record the modules storefront pages load and write a bundle definition file
    Generate(GenerateCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        let settings = Settings::load(&self.dir, &self.config)?;

        match &self.command {
            Commands::Bundle(cmd) => cmd.execute(settings),
            Commands::Generate(cmd) => cmd.execute(settings).await,
        }
    }
}

fn print_banner() {
    eprintln!(
        "\n{} {}\n",
        "localebundle".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
