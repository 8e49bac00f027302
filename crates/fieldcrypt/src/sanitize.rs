//! Helpers for keeping uploaded names and paths safe.
//!
//! Uploaded filenames come from clients and are used to build paths inside
//! the work directory; log lines should show names, never full paths.

use std::path::Path;

const FALLBACK_NAME: &str = "upload";

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Reduces a client-supplied filename to a single safe path component.
///
/// Directory parts (either separator style) are dropped, control characters
/// are replaced and `.`/`..` fall back to a fixed name.
pub fn safe_filename(original: &str) -> String {
    let last = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = last
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}
