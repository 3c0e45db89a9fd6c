//! Locale and module path resolution
//!
//! Finds the deployed vendor/theme/locale directories and maps module ids to
//! files inside them.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::utils::{relative_path, to_slash};

/// Loader plugin prefix for raw text resources
pub const TEXT_PLUGIN: &str = "text!";

/// Marker file whose minified variant means the deployment is minified
const LOADER_MIN_FILE: &str = "requirejs/require.min.js";

/// Depth of locale directories below the area root (vendor/theme/locale)
const LOCALE_DEPTH: usize = 3;

/// Errors raised while discovering locales
#[derive(Error, Debug)]
pub enum LocaleError {
    /// Nothing deployed under the area root
    #[error(
        "No locales found under {}! Make sure bundling runs after static content is deployed.",
        .root.display()
    )]
    NoLocales { root: PathBuf },

    /// Exclusion pattern failed to compile
    #[error("Invalid theme exclusion pattern '{pattern}': {source}")]
    InvalidExclude {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// One deployed area/theme/locale directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    /// Absolute directory path
    pub path: PathBuf,

    /// Path relative to the project directory, as users write it
    pub display: String,
}

/// Enumerates deployed locales
pub struct LocaleResolver {
    /// Project directory
    project_root: PathBuf,

    /// Frontend area root
    area_root: PathBuf,
}

impl LocaleResolver {
    /// Create a resolver for `area_root` inside `project_root`
    pub fn new(project_root: impl Into<PathBuf>, area_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            area_root: area_root.into(),
        }
    }

    /// List locales in sorted order, minus any matching `exclude`.
    ///
    /// Exclusions are project-relative paths such as
    /// `pub/static/frontend/Magento/blank/en_US`, glob patterns allowed.
    pub fn resolve(&self, exclude: &[String]) -> Result<Vec<Locale>, LocaleError> {
        let excluded = build_globset(exclude)?;

        let locales: Vec<Locale> = WalkDir::new(&self.area_root)
            .min_depth(LOCALE_DEPTH)
            .max_depth(LOCALE_DEPTH)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(|e| {
                let path = e.into_path();
                let display = relative_path(&self.project_root, &path)
                    .unwrap_or_else(|| to_slash(&path));
                Locale { path, display }
            })
            .filter(|locale| {
                let skip = excluded.is_match(&locale.display);
                if skip {
                    debug!("Excluding locale {}", locale.display);
                }
                !skip
            })
            .collect();

        if locales.is_empty() {
            return Err(LocaleError::NoLocales {
                root: self.area_root.clone(),
            });
        }

        Ok(locales)
    }
}

/// Split a comma separated exclusion list
pub fn parse_exclude_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.trim_end_matches('/').to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, LocaleError> {
    let mut builder = GlobSetBuilder::new();

    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| LocaleError::InvalidExclude {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }

    builder.build().map_err(|source| LocaleError::InvalidExclude {
        pattern: patterns.join(","),
        source,
    })
}

/// Whether minified asset variants are deployed in any locale
pub fn is_minify_on(locales: &[Locale]) -> bool {
    locales
        .iter()
        .any(|locale| locale.path.join(LOADER_MIN_FILE).is_file())
}

/// Map a module id to its file path relative to a locale
///
/// `text!` resources keep their own extension and are never minified.
/// Scripts get `.js` appended when missing, and `.min.js` in minified mode.
pub fn module_path(id: &str, override_path: Option<&str>, minify: bool) -> PathBuf {
    if let Some(resource) = id.strip_prefix(TEXT_PLUGIN) {
        return PathBuf::from(override_path.unwrap_or(resource));
    }

    let mut path = override_path.unwrap_or(id).to_string();

    if !path.ends_with(".js") {
        path.push_str(".js");
    }

    if minify && !path.ends_with(".min.js") {
        path.truncate(path.len() - ".js".len());
        path.push_str(".min.js");
    }

    PathBuf::from(path)
}

/// Path of a generated file (artifact or loader config) inside a locale
pub fn output_path(locale: &Path, prefix: &str, name: &str, minify: bool) -> PathBuf {
    let suffix = if minify { ".min.js" } else { ".js" };
    locale.join(format!("{}{}", bundle_key(prefix, name), suffix))
}

/// Loader key under which a bundle's module list is registered
pub fn bundle_key(prefix: &str, name: &str) -> String {
    format!("{}-{}", prefix, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn deploy(root: &Path, locales: &[&str]) {
        for locale in locales {
            fs::create_dir_all(root.join("pub/static/frontend").join(locale)).unwrap();
        }
    }

    #[test]
    fn test_resolve_sorted_locales() {
        let dir = TempDir::new().unwrap();
        deploy(dir.path(), &["Vendor/luma/en_US", "Magento/blank/en_US", "Magento/blank/de_DE"]);
        // files at locale depth are not locales
        fs::write(dir.path().join("pub/static/frontend/Magento/blank/deployed_version.txt"), "1").unwrap();

        let resolver = LocaleResolver::new(dir.path(), dir.path().join("pub/static/frontend"));
        let locales = resolver.resolve(&[]).unwrap();
        let names: Vec<_> = locales.iter().map(|l| l.display.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "pub/static/frontend/Magento/blank/de_DE",
                "pub/static/frontend/Magento/blank/en_US",
                "pub/static/frontend/Vendor/luma/en_US",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_locales_are_found() {
        let dir = TempDir::new().unwrap();
        deploy(dir.path(), &["Magento/blank/en_US"]);
        fs::create_dir_all(dir.path().join("shared/luma/en_US")).unwrap();
        fs::create_dir_all(dir.path().join("shared/fr_FR")).unwrap();
        fs::create_dir_all(dir.path().join("pub/static/frontend/Vendor")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("shared/luma"),
            dir.path().join("pub/static/frontend/Vendor/luma"),
        )
        .unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("shared/fr_FR"),
            dir.path().join("pub/static/frontend/Magento/blank/fr_FR"),
        )
        .unwrap();

        let resolver = LocaleResolver::new(dir.path(), dir.path().join("pub/static/frontend"));
        let locales = resolver.resolve(&[]).unwrap();
        let names: Vec<_> = locales.iter().map(|l| l.display.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "pub/static/frontend/Magento/blank/en_US",
                "pub/static/frontend/Magento/blank/fr_FR",
                "pub/static/frontend/Vendor/luma/en_US",
            ]
        );
    }

    #[test]
    fn test_resolve_with_exclusions() {
        let dir = TempDir::new().unwrap();
        deploy(dir.path(), &["Magento/blank/en_US", "Magento/luma/en_US", "Vendor/shop/en_US"]);

        let resolver = LocaleResolver::new(dir.path(), dir.path().join("pub/static/frontend"));
        let exclude = parse_exclude_list(Some(
            "pub/static/frontend/Magento/blank/en_US, pub/static/frontend/Magento/luma/*",
        ));
        let locales = resolver.resolve(&exclude).unwrap();

        assert_eq!(locales.len(), 1);
        assert_eq!(locales[0].display, "pub/static/frontend/Vendor/shop/en_US");
    }

    #[test]
    fn test_no_locales_is_an_error() {
        let dir = TempDir::new().unwrap();
        let resolver = LocaleResolver::new(dir.path(), dir.path().join("pub/static/frontend"));

        let err = resolver.resolve(&[]).unwrap_err();
        assert!(matches!(err, LocaleError::NoLocales { .. }));
        assert!(err.to_string().contains("No locales found"));
    }

    #[test]
    fn test_everything_excluded_is_an_error() {
        let dir = TempDir::new().unwrap();
        deploy(dir.path(), &["Magento/blank/en_US"]);

        let resolver = LocaleResolver::new(dir.path(), dir.path().join("pub/static/frontend"));
        let exclude = vec!["pub/static/frontend/Magento/blank/en_US".to_string()];

        assert!(matches!(resolver.resolve(&exclude), Err(LocaleError::NoLocales { .. })));
    }

    #[test]
    fn test_parse_exclude_list() {
        assert!(parse_exclude_list(None).is_empty());
        assert_eq!(parse_exclude_list(Some("a/b/c/, ,d")), vec!["a/b/c", "d"]);
    }

    #[test]
    fn test_minify_detection() {
        let dir = TempDir::new().unwrap();
        deploy(dir.path(), &["Magento/blank/en_US", "Magento/luma/en_US"]);

        let resolver = LocaleResolver::new(dir.path(), dir.path().join("pub/static/frontend"));
        let locales = resolver.resolve(&[]).unwrap();
        assert!(!is_minify_on(&locales));

        let requirejs = locales[1].path.join("requirejs");
        fs::create_dir_all(&requirejs).unwrap();
        fs::write(requirejs.join("require.min.js"), "").unwrap();
        assert!(is_minify_on(&locales));
    }

    #[test]
    fn test_module_path_scripts() {
        assert_eq!(module_path("jquery", None, false), PathBuf::from("jquery.js"));
        assert_eq!(module_path("jquery", None, true), PathBuf::from("jquery.min.js"));
        assert_eq!(
            module_path("jquery/jquery.cookie", None, false),
            PathBuf::from("jquery/jquery.cookie.js")
        );
        assert_eq!(
            module_path("mage/url", Some("mage/url.js"), true),
            PathBuf::from("mage/url.min.js")
        );
        assert_eq!(
            module_path("lib", Some("vendor/lib.min.js"), true),
            PathBuf::from("vendor/lib.min.js")
        );
        assert_eq!(module_path("lib", Some("vendor/lib"), false), PathBuf::from("vendor/lib.js"));
    }

    #[test]
    fn test_module_path_text_resources() {
        assert_eq!(
            module_path("text!ui/template/modal.html", None, true),
            PathBuf::from("ui/template/modal.html")
        );
        assert_eq!(
            module_path("text!ui/template/modal.html", Some("Magento_Ui/templates/modal.html"), false),
            PathBuf::from("Magento_Ui/templates/modal.html")
        );
    }

    #[test]
    fn test_output_paths() {
        let locale = Path::new("/l");
        assert_eq!(
            output_path(locale, "localebundle/bundle", "common", true),
            PathBuf::from("/l/localebundle/bundle-common.min.js")
        );
        assert_eq!(
            output_path(locale, "localebundle/requirejs-config", "common", false),
            PathBuf::from("/l/localebundle/requirejs-config-common.js")
        );
        assert_eq!(bundle_key("localebundle/bundle", "cms"), "localebundle/bundle-cms");
    }
}
