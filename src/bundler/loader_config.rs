//! Loader config fragment telling RequireJS which ids live in a bundle

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct LoaderConfig<'a> {
    bundles: IndexMap<&'a str, &'a [String]>,
}

/// Render `requirejs.config({"bundles": {key: [ids...]}});`
pub fn render(bundle_key: &str, modules: &[String]) -> serde_json::Result<String> {
    let mut bundles = IndexMap::new();
    bundles.insert(bundle_key, modules);

    let json = serde_json::to_string(&LoaderConfig { bundles })?;

    Ok(format!("requirejs.config({});", json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fragment() {
        let modules = vec!["jquery".to_string(), "underscore".to_string()];
        assert_eq!(
            render("localebundle/bundle-common", &modules).unwrap(),
            r#"requirejs.config({"bundles":{"localebundle/bundle-common":["jquery","underscore"]}});"#
        );
    }

    #[test]
    fn test_render_empty_bundle() {
        assert_eq!(
            render("b-empty", &[]).unwrap(),
            r#"requirejs.config({"bundles":{"b-empty":[]}});"#
        );
    }
}
