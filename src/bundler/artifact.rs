//! Bundle assembly: resolve, read, wrap and concatenate declared modules

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::BundleDefinition;
use crate::resolver::module_path;
use crate::transform::wrap_module;

/// Where module sources are read from
pub trait ModuleSource {
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// Reads modules from the real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSource;

impl ModuleSource for FsSource {
    fn read(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// In-memory module tree, keyed by full path
impl ModuleSource for HashMap<PathBuf, String> {
    fn read(&self, path: &Path) -> io::Result<String> {
        self.get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

/// A module while it is being added to a bundle
#[derive(Debug)]
struct ModuleEntry<'a> {
    id: &'a str,
    path: PathBuf,
    raw: String,
}

impl ModuleEntry<'_> {
    fn wrapped(&self) -> std::borrow::Cow<'_, str> {
        wrap_module(self.id, &self.path, &self.raw)
    }
}

/// Concatenated bundle text and the ids that made it in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleArtifact {
    /// Wrapped modules, newline separated, in declared order
    pub contents: String,

    /// Ids included, in declared order; missing files are left out
    pub modules: Vec<String>,
}

impl BundleArtifact {
    /// Replace the text after whole-bundle minification
    pub fn with_contents(self, contents: String) -> Self {
        Self { contents, ..self }
    }
}

/// Assemble one bundle for one locale.
///
/// A module whose file cannot be read is skipped and assembly continues.
pub fn assemble(
    source: &dyn ModuleSource,
    locale: &Path,
    definition: &BundleDefinition,
    minify: bool,
) -> BundleArtifact {
    let mut artifact = BundleArtifact::default();

    debug!("Collecting modules for \"{}\"", definition.name);

    for (id, override_path) in &definition.modules {
        let path = locale.join(module_path(id, override_path.as_deref(), minify));

        debug!("Loading \"{}\" from \"{}\"", id, path.display());

        let raw = match source.read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Module \"{}\" not found under \"{}\": {}", id, path.display(), e);
                continue;
            }
        };

        let entry = ModuleEntry { id, path, raw };
        artifact.contents.push_str(&entry.wrapped());
        artifact.contents.push('\n');
        artifact.modules.push(id.clone());
    }

    debug!("Bundle \"{}\" collected", definition.name);

    artifact
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn definition(name: &str, modules: &[(&str, Option<&str>)]) -> BundleDefinition {
        let mut definition = BundleDefinition::new(name);
        for (id, path) in modules {
            definition
                .modules
                .insert(id.to_string(), path.map(str::to_string));
        }
        definition
    }

    fn tree(files: &[(&str, &str)]) -> HashMap<PathBuf, String> {
        files
            .iter()
            .map(|(path, text)| (PathBuf::from(path), text.to_string()))
            .collect()
    }

    #[test]
    fn test_all_modules_present() {
        let files = tree(&[
            ("/l/jquery.js", "define('jquery', [], function () { return {}; });"),
            ("/l/underscore.js", "window._ = {};"),
        ]);
        let common = definition("common", &[("jquery", None), ("underscore", None)]);

        let artifact = assemble(&files, Path::new("/l"), &common, false);

        assert_eq!(artifact.modules, vec!["jquery", "underscore"]);
        assert_eq!(
            artifact.contents,
            "define('jquery', [], function () { return {}; });\n\
             define('underscore', [], function () {\nwindow._ = {};\n});\n"
        );
    }

    #[test]
    fn test_missing_module_is_skipped() {
        let files = tree(&[("/l/jquery.js", "define('jquery', function () {});")]);
        let common = definition("common", &[("jquery", None), ("underscore", None)]);

        let artifact = assemble(&files, Path::new("/l"), &common, false);

        assert_eq!(artifact.modules, vec!["jquery"]);
        assert_eq!(artifact.contents, "define('jquery', function () {});\n");
    }

    #[test]
    fn test_declared_order_is_kept() {
        let files = tree(&[
            ("/l/a.js", "define('a', 1);"),
            ("/l/c.js", "define('c', 1);"),
            ("/l/d.js", "define('d', 1);"),
        ]);
        let bundle = definition("x", &[("d", None), ("b", None), ("a", None), ("c", None)]);

        let artifact = assemble(&files, Path::new("/l"), &bundle, false);

        assert_eq!(artifact.modules, vec!["d", "a", "c"]);
        assert!(artifact.contents.find("'d'").unwrap() < artifact.contents.find("'a'").unwrap());
        assert!(artifact.contents.find("'a'").unwrap() < artifact.contents.find("'c'").unwrap());
    }

    #[test]
    fn test_minified_paths_and_overrides() {
        let files = tree(&[
            ("/l/mage/url.min.js", "define(function () {});"),
            ("/l/Magento_Ui/templates/modal.html", "<p></p>"),
        ]);
        let bundle = definition(
            "x",
            &[
                ("mage/url", None),
                ("text!ui/template/modal.html", Some("Magento_Ui/templates/modal.html")),
            ],
        );

        let artifact = assemble(&files, Path::new("/l"), &bundle, true);

        assert_eq!(artifact.modules, vec!["mage/url", "text!ui/template/modal.html"]);
        assert!(artifact.contents.starts_with("define('mage/url', function () {});\n"));
        assert!(artifact
            .contents
            .contains("define('text!ui/template/modal.html', function () {\n    return \"<p></p>\";"));
    }

    #[test]
    fn test_empty_definition() {
        let artifact = assemble(&tree(&[]), Path::new("/l"), &BundleDefinition::new("none"), false);
        assert_eq!(artifact, BundleArtifact::default());
    }
}
