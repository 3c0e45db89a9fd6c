//! Product option selection strategies

use std::fs;
use std::path::PathBuf;

use super::CollectorError;

/// Picks mandatory product options before adding to cart
const DEFAULT_RESOLVER: &str = include_str!("scripts/select_options.js");

/// Which script selects product options on the product page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OptionResolver {
    /// First enabled choice of every swatch group
    #[default]
    Default,

    /// A file holding a JavaScript function expression
    Script(PathBuf),
}

impl OptionResolver {
    /// Expression that runs the resolver on the page
    pub fn expression(&self) -> Result<String, CollectorError> {
        let function = match self {
            OptionResolver::Default => DEFAULT_RESOLVER.to_string(),
            OptionResolver::Script(path) => {
                fs::read_to_string(path).map_err(|source| CollectorError::ResolverScript {
                    path: path.clone(),
                    source,
                })?
            }
        };

        Ok(invoke(&function))
    }
}

/// Wrap a function expression into an immediately invoked call
fn invoke(function: &str) -> String {
    let function = function.trim().trim_end_matches(';').trim_end();
    format!("({})()", function)
}
