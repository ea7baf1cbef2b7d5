//! Absolute/relative path conversion against the library root.
//!
//! Everything persisted stores a path relative to the configured root,
//! so relocating the library only requires changing that one setting.
//! The root itself maps to `"."`.

use std::path::{Component, Path, PathBuf};

/// Convert an absolute path to the root-relative string stored in the
/// index. Paths outside the root fall back to their display form.
pub fn to_relative(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) => {
            let parts: Vec<&str> = rel
                .components()
                .filter_map(|c| match c {
                    Component::Normal(seg) => seg.to_str(),
                    _ => None,
                })
                .collect();
            if parts.is_empty() {
                ".".to_string()
            } else {
                parts.join("/")
            }
        }
        Err(_) => path.display().to_string(),
    }
}

/// Resolve a stored relative path back to an absolute one.
pub fn to_absolute(relative: &str, root: &Path) -> PathBuf {
    if relative == "." {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}
