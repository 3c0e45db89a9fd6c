//! Utility functions and helpers

use std::hash::Hash;
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;

/// Merge ordered maps left to right.
///
/// Keys keep the position of their first appearance, values come from the
/// last map that carries them.
pub fn merge_right<K, V, I>(maps: I) -> IndexMap<K, V>
where
    K: Hash + Eq,
    I: IntoIterator<Item = IndexMap<K, V>>,
{
    let mut merged = IndexMap::new();

    for map in maps {
        for (key, value) in map {
            // `insert` keeps the existing slot for known keys
            merged.insert(key, value);
        }
    }

    merged
}

/// Get relative path from base to target, always with forward slashes
pub fn relative_path(from: &Path, to: &Path) -> Option<String> {
    pathdiff::diff_paths(to, from).map(|p| to_slash(&p))
}

/// Render a path with forward slashes
pub fn to_slash(path: &Path) -> String {
    path.display().to_string().replace('\\', "/")
}

/// Size of `content` once gzipped at the default level
pub fn gzip_size(content: &[u8]) -> std::io::Result<usize> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    Ok(encoder.finish()?.len())
}

/// Format bytes as whole kilobytes, rounded to nearest
pub fn format_kb(bytes: usize) -> String {
    format!("{} kB", (bytes as f64 / 1024.0).round() as u64)
}
