//! Configuration schema definitions

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Module id -> optional path override, in bundle order
pub type ModuleMap = IndexMap<String, Option<String>>;

/// A named, ordered set of modules to concatenate into one bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDefinition {
    /// Bundle name, used in output file names and the loader key
    pub name: String,

    /// Modules to include, insertion order is bundle order
    #[serde(default)]
    pub modules: ModuleMap,
}

impl BundleDefinition {
    /// Create an empty definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modules: ModuleMap::new(),
        }
    }
}

/// Deployed static content layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalesConfig {
    /// Frontend area root, relative to the project directory
    #[serde(default = "default_locales_root")]
    pub root: String,
}

impl Default for LocalesConfig {
    fn default() -> Self {
        Self {
            root: default_locales_root(),
        }
    }
}

fn default_locales_root() -> String {
    "pub/static/frontend".to_string()
}

/// Output naming
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Bundle file prefix, relative to each locale. Also the loader key prefix.
    #[serde(default = "default_bundle_prefix")]
    pub bundle_prefix: String,

    /// Loader config fragment prefix, relative to each locale
    #[serde(default = "default_config_prefix")]
    pub config_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bundle_prefix: default_bundle_prefix(),
            config_prefix: default_config_prefix(),
        }
    }
}

fn default_bundle_prefix() -> String {
    "localebundle/bundle".to_string()
}

fn default_config_prefix() -> String {
    "localebundle/requirejs-config".to_string()
}

/// Minifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinifyConfig {
    /// Minifier executable name or path
    #[serde(default = "default_terser")]
    pub terser: String,
}

impl Default for MinifyConfig {
    fn default() -> Self {
        Self {
            terser: default_terser(),
        }
    }
}

fn default_terser() -> String {
    "terser".to_string()
}

/// Browser used by the module collectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Explicit browser executable; looked up on PATH when unset
    #[serde(default)]
    pub executable: Option<String>,

    /// Extra command line arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Run without a window
    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            args: Vec::new(),
            headless: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Module collection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Glob patterns of module ids dropped from collected bundles
    #[serde(default)]
    pub exclude: Vec<String>,
}
