use std::path::Path;

use serde::{Deserialize, Serialize};

/// Supported comic container formats, tagged on each indexed comic.
///
/// The tag records what the file extension claims; the archive layer
/// probes the other format when the claimed one fails to open.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ComicFormat {
    /// Zip container (`.cbz`).
    Cbz,
    /// Rar container (`.cbr`).
    Cbr,
}

impl ComicFormat {
    /// Select a format from a file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext.to_ascii_lowercase().as_str() {
            "cbz" => Some(ComicFormat::Cbz),
            "cbr" => Some(ComicFormat::Cbr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComicFormat::Cbz => "cbz",
            ComicFormat::Cbr => "cbr",
        }
    }
}

impl std::fmt::Display for ComicFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
