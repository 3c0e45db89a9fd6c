//! Core bundler implementation
//!
//! Builds one bundle per (locale, bundle definition), optionally minifies
//! it, and writes the artifact plus its loader config fragment.

mod artifact;
mod loader_config;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::BundleOptions;
use crate::config::{load_definitions, BundleDefinition, Settings};
use crate::minify::{Minifier, Terser};
use crate::resolver::{bundle_key, is_minify_on, output_path, Locale, LocaleResolver};
use crate::utils::{format_kb, gzip_size};

pub use artifact::{assemble, BundleArtifact, FsSource, ModuleSource};
pub use loader_config::render as render_loader_config;

/// Result of a bundling run
#[derive(Debug)]
pub struct BuildResult {
    /// Generated bundles, in generation order
    pub bundles: Vec<BundleInfo>,

    /// Whether minified variants were produced
    pub minified: bool,
}

/// Information about a generated bundle
#[derive(Debug)]
pub struct BundleInfo {
    /// Locale the bundle belongs to
    pub locale: String,

    /// Bundle name
    pub name: String,

    /// Artifact path
    pub output_path: PathBuf,

    /// Loader config fragment path
    pub config_path: PathBuf,

    /// Ids included in the artifact
    pub modules: Vec<String>,

    /// Artifact size in bytes
    pub size: usize,

    /// Gzipped artifact size in bytes
    pub gzip_size: usize,
}

impl BundleInfo {
    /// Human readable completion line
    pub fn summary(&self) -> String {
        format!(
            "{:<30}- {} ({} gz).",
            format!("Generated bundle \"{}\"", self.name),
            format_kb(self.size),
            format_kb(self.gzip_size)
        )
    }
}

/// The main bundler
pub struct Bundler {
    /// Tool settings
    settings: Arc<Settings>,

    /// Run options
    options: BundleOptions,

    /// Module reader
    source: Box<dyn ModuleSource>,

    /// Minifier used when the deployment is minified
    minifier: Option<Box<dyn Minifier>>,
}

impl Bundler {
    /// Create a new bundler reading modules from disk
    pub fn new(settings: Settings, options: BundleOptions) -> Self {
        Self {
            settings: Arc::new(settings),
            options,
            source: Box::new(FsSource),
            minifier: None,
        }
    }

    /// Read modules from another source
    pub fn with_source(mut self, source: Box<dyn ModuleSource>) -> Self {
        self.source = source;
        self
    }

    /// Use a specific minifier instead of `terser` from the settings
    pub fn with_minifier(mut self, minifier: Box<dyn Minifier>) -> Self {
        self.minifier = Some(minifier);
        self
    }

    /// Build every bundle for every deployed locale
    pub fn build(&self) -> Result<BuildResult> {
        let start = Instant::now();

        let bundles_path = self.settings.resolve(&self.options.bundles);
        info!("Using bundling config from \"{}\"", bundles_path.display());
        let definitions = load_definitions(&bundles_path)?;

        let locales = LocaleResolver::new(&self.settings.root, self.settings.locales_root())
            .resolve(&self.options.exclude_themes)?;

        let minified = is_minify_on(&locales);
        let terser;
        let minifier: Option<&dyn Minifier> = match (&self.minifier, minified) {
            (_, false) => None,
            (Some(minifier), true) => Some(&**minifier),
            (None, true) => {
                let tool = Terser::new(&self.settings.minify.terser);
                tool.ensure_available()?;
                terser = tool;
                Some(&terser)
            }
        };

        let mut bundles = Vec::new();

        for locale in &locales {
            info!("Creating bundles for \"{}\"", locale.display);

            for definition in &definitions {
                let bundle = self
                    .build_bundle(locale, definition, minifier)
                    .with_context(|| {
                        format!(
                            "Failed to build bundle \"{}\" for \"{}\"",
                            definition.name, locale.display
                        )
                    })?;
                info!("{}", bundle.summary());
                bundles.push(bundle);
            }
        }

        debug!("Bundling completed in {:?}", start.elapsed());

        Ok(BuildResult { bundles, minified })
    }

    /// Assemble, minify and write one bundle
    fn build_bundle(
        &self,
        locale: &Locale,
        definition: &BundleDefinition,
        minifier: Option<&dyn Minifier>,
    ) -> Result<BundleInfo> {
        debug!("Creating bundle \"{}\"", definition.name);

        let minified = minifier.is_some();
        let mut artifact = assemble(self.source.as_ref(), &locale.path, definition, minified);

        if let Some(minifier) = minifier {
            debug!("Minifying \"{}\" bundle", definition.name);
            let code = minifier.minify(&artifact.contents)?;
            artifact = artifact.with_contents(code);
        }

        let output = &self.settings.output;
        let artifact_path = output_path(&locale.path, &output.bundle_prefix, &definition.name, minified);
        let config_path = output_path(&locale.path, &output.config_prefix, &definition.name, minified);

        debug!("Writing \"{}\" bundle and configuration to disk", definition.name);

        write_file(&artifact_path, &artifact.contents)?;

        let key = bundle_key(&output.bundle_prefix, &definition.name);
        write_file(&config_path, &render_loader_config(&key, &artifact.modules)?)?;

        let gzip_size = gzip_size(artifact.contents.as_bytes())
            .context("Failed to measure compressed bundle size")?;

        Ok(BundleInfo {
            locale: locale.display.clone(),
            name: definition.name.clone(),
            output_path: artifact_path,
            config_path,
            size: artifact.contents.len(),
            gzip_size,
            modules: artifact.modules,
        })
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}
