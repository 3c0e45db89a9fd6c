//! Bundle minification
//!
//! Compresses a whole assembled bundle through an external `terser` binary.

use std::io::Write;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

/// Identifiers that must survive mangling: the loader's own globals and
/// the jQuery aliases modules reference without importing.
pub const RESERVED_NAMES: &[&str] = &["$", "jQuery", "define", "require", "exports"];

/// Errors raised while minifying a bundle
#[derive(Error, Debug)]
pub enum MinifyError {
    /// Minifier executable not found
    #[error("Minifier '{0}' not found in PATH. Install it with `npm install -g terser`.")]
    ToolMissing(String),

    /// I/O error talking to the minifier
    #[error("I/O error running minifier: {0}")]
    Io(#[from] std::io::Error),

    /// Minifier rejected the input
    #[error("Minifier failed: {0}")]
    Failed(String),

    /// Output was not UTF-8
    #[error("Minifier produced invalid UTF-8 output")]
    InvalidOutput(#[from] std::string::FromUtf8Error),
}

/// Compresses a complete bundle text
pub trait Minifier {
    fn minify(&self, code: &str) -> Result<String, MinifyError>;
}

/// Runs the `terser` CLI
#[derive(Debug, Clone)]
pub struct Terser {
    binary: String,
}

impl Terser {
    /// Use the given executable name or path
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check the executable can be found before any bundle is assembled
    pub fn ensure_available(&self) -> Result<(), MinifyError> {
        which::which(&self.binary)
            .map(|_| ())
            .map_err(|_| MinifyError::ToolMissing(self.binary.clone()))
    }

    fn mangle_option() -> String {
        let reserved: Vec<String> = RESERVED_NAMES.iter().map(|n| format!("'{}'", n)).collect();
        format!("reserved=[{}]", reserved.join(","))
    }
}

impl Minifier for Terser {
    fn minify(&self, code: &str) -> Result<String, MinifyError> {
        debug!("Running {} on {} bytes", self.binary, code.len());

        let mut child = Command::new(&self.binary)
            .arg("--compress")
            .arg("--mangle")
            .arg(Self::mangle_option())
            .arg("--format")
            .arg("comments=false")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => MinifyError::ToolMissing(self.binary.clone()),
                _ => MinifyError::Io(e),
            })?;

        // Feed stdin from a thread so a full stdout pipe cannot deadlock us
        let mut stdin = child.stdin.take().ok_or_else(|| {
            MinifyError::Io(std::io::Error::other("minifier stdin unavailable"))
        })?;
        let input = code.to_owned();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .map_err(|_| MinifyError::Failed("stdin writer panicked".to_string()))?;

        if !output.status.success() {
            return Err(MinifyError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        written?;

        Ok(String::from_utf8(output.stdout)?)
    }
}
