//! Configuration handling
//!
//! Parses `localebundle.toml` tool settings and reads/writes bundle
//! definition files.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use schema::*;

/// Tool settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Deployed locale discovery
    #[serde(default)]
    pub locales: LocalesConfig,

    /// Output naming
    #[serde(default)]
    pub output: OutputConfig,

    /// Minifier
    #[serde(default)]
    pub minify: MinifyConfig,

    /// Browser for module collection
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Module collection
    #[serde(default)]
    pub generate: GenerateConfig,

    /// Project directory every relative path is resolved against
    #[serde(skip)]
    pub root: PathBuf,
}

impl Settings {
    /// Load settings for the project at `root`.
    ///
    /// `path` is resolved against `root`. A missing file yields defaults.
    pub fn load<P: AsRef<Path>>(root: &Path, path: P) -> Result<Self> {
        let path = root.join(path.as_ref());

        let mut settings = if path.is_file() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            toml::from_str::<Settings>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Settings::default()
        };

        settings.root = root.to_path_buf();

        Ok(settings)
    }

    /// Create settings with defaults rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Absolute frontend area root
    pub fn locales_root(&self) -> PathBuf {
        self.root.join(&self.locales.root)
    }

    /// Resolve a user supplied path against the project directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }
}

/// Read an ordered list of bundle definitions from a JSON file
pub fn load_definitions(path: &Path) -> Result<Vec<BundleDefinition>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read bundling config: {}", path.display()))?;

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse bundling config: {}", path.display()))
}

/// Write bundle definitions as pretty JSON
pub fn save_definitions(path: &Path, definitions: &[BundleDefinition]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(definitions)?;
    fs::write(path, json + "\n")
        .with_context(|| format!("Failed to write bundling config: {}", path.display()))
}
