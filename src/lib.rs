//! localebundle library
//!
//! Builds per-locale JavaScript bundles for storefronts that load modules
//! through an AMD loader, and records which modules storefront pages use.

pub mod browser;
pub mod bundler;
pub mod cli;
pub mod collector;
pub mod config;
pub mod minify;
pub mod resolver;
pub mod transform;
pub mod utils;

pub use bundler::Bundler;
pub use cli::Cli;
pub use config::{BundleDefinition, Settings};
