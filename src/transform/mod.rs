//! Module wrapping
//!
//! Rewrites a module's source so it registers itself with the AMD loader
//! under a known id, which is what lets many modules share one bundle file.

mod scanner;

use std::borrow::Cow;
use std::path::Path;

pub use scanner::{Scanner, Token, TokenKind};

/// How a module's source has to be rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFormat {
    /// Not a script: registered as a string-valued module
    Resource,
    /// Script without a `define(` call
    Plain,
    /// `define(` call without an id; the id goes in at `insert_at`
    Anonymous { insert_at: usize, has_args: bool },
    /// `define(` call that already names itself
    Named,
}

impl ModuleFormat {
    /// Classify a module by file path and source text
    pub fn detect(path: &Path, source: &str) -> Self {
        if !is_script_path(path) {
            return ModuleFormat::Resource;
        }

        find_define_call(source)
    }
}

/// Whether the loader executes this file as a script
pub fn is_script_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("js"))
}

/// Wrap a module's source so it self-registers as `id`
pub fn wrap_module<'a>(id: &str, path: &Path, source: &'a str) -> Cow<'a, str> {
    match ModuleFormat::detect(path, source) {
        ModuleFormat::Resource => Cow::Owned(wrap_text(id, source)),
        ModuleFormat::Plain => Cow::Owned(wrap_plain(id, source)),
        ModuleFormat::Anonymous {
            insert_at,
            has_args,
        } => Cow::Owned(name_anonymous(id, source, insert_at, has_args)),
        ModuleFormat::Named => Cow::Borrowed(source),
    }
}

/// Box a raw resource as a module returning its text
pub fn wrap_text(id: &str, text: &str) -> String {
    format!(
        "define({}, function () {{\n    return {};\n}});",
        quote_id(id),
        js_string(text)
    )
}

/// Turn a global-side-effect script into a dependency-free module
pub fn wrap_plain(id: &str, source: &str) -> String {
    format!("define({}, [], function () {{\n{}\n}});", quote_id(id), source)
}

fn name_anonymous(id: &str, source: &str, insert_at: usize, has_args: bool) -> String {
    let quoted = quote_id(id);
    let separator = if has_args { ", " } else { "" };

    let mut out = String::with_capacity(source.len() + quoted.len() + separator.len());
    out.push_str(&source[..insert_at]);
    out.push_str(&quoted);
    out.push_str(separator);
    out.push_str(&source[insert_at..]);
    out
}

/// Locate the first real `define(` call and inspect its first argument.
///
/// Property accesses (`foo.define(`), function declarations and method
/// shorthand (`define(a) { ... }`) are not calls.
fn find_define_call(source: &str) -> ModuleFormat {
    let mut scanner = Scanner::new(source);
    let tokens: Vec<Token> = scanner.by_ref().collect();

    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Ident || scanner.slice(token) != "define" {
            continue;
        }

        let declared = match i.checked_sub(1).map(|p| &tokens[p]) {
            Some(prev) if prev.kind == TokenKind::Punct(b'.') => true,
            Some(prev) => prev.kind == TokenKind::Ident && scanner.slice(prev) == "function",
            None => false,
        };
        if declared {
            continue;
        }

        let Some(open) = tokens.get(i + 1).filter(|t| t.kind == TokenKind::Punct(b'(')) else {
            continue;
        };
        if has_body_after_parens(&tokens, i + 1) {
            continue;
        }

        return match tokens.get(i + 2) {
            Some(Token {
                kind: TokenKind::Str,
                ..
            }) => ModuleFormat::Named,
            first => ModuleFormat::Anonymous {
                insert_at: open.end,
                has_args: !matches!(
                    first,
                    None | Some(Token {
                        kind: TokenKind::Punct(b')'),
                        ..
                    })
                ),
            },
        };
    }

    ModuleFormat::Plain
}

/// Whether the parenthesised list opening at `open` is directly followed by `{`
fn has_body_after_parens(tokens: &[Token], open: usize) -> bool {
    let mut depth = 0usize;

    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::Punct(b'(') => depth += 1,
            TokenKind::Punct(b')') => {
                depth -= 1;
                if depth == 0 {
                    return tokens
                        .get(i + 1)
                        .is_some_and(|next| next.kind == TokenKind::Punct(b'{'));
                }
            }
            _ => {}
        }
    }

    false
}

/// Single-quoted JS string literal for a module id
fn quote_id(id: &str) -> String {
    format!("'{}'", id.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// JS string literal holding `text` verbatim
fn js_string(text: &str) -> String {
    // JSON strings are JS strings apart from the two line separators
    serde_json::Value::String(text.to_string())
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}
