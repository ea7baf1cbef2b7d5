//! Typed configuration for Longbox components.
//!
//! There is no cached global here: a [`LongboxConfig`] is constructed
//! explicitly (from a TOML file or from defaults) and handed to each
//! component at construction time, which keeps tests free to run with
//! distinct configurations side by side.
#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use longbox_core::fs_watch::MonitorConfig;
use longbox_core::thumbnails::ThumbnailService;
use serde::{Deserialize, Serialize};

/// Top-level configuration. Only `[library]` is required; every other
/// section falls back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongboxConfig {
    pub library: LibrarySection,
    #[serde(default)]
    pub scanner: ScannerSection,
    #[serde(default)]
    pub thumbnails: ThumbnailSection,
    #[serde(default)]
    pub monitoring: MonitoringSection,
    /// Where persistent state (index database, thumbnails) lives.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySection {
    /// Root of the comic collection; everything in the index is stored
    /// relative to it.
    pub path: PathBuf,
    #[serde(default = "default_library_name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSection {
    /// File/directory names skipped during walks.
    pub ignore_patterns: Vec<String>,
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                "@eaDir".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSection {
    pub width: u32,
    pub height: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for ThumbnailSection {
    fn default() -> Self {
        Self {
            width: 300,
            height: 450,
            quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSection {
    pub enabled: bool,
    /// Accumulation window (ms) that groups bursts of raw events into one
    /// batch.
    pub batch_window_ms: u64,
    /// Per-path re-fire interval (ms) for modified events, suppressing
    /// duplicate editor saves. Deliberately separate from the batch
    /// window.
    pub modified_debounce_ms: u64,
}

impl Default for MonitoringSection {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_window_ms: 1_000,
            modified_debounce_ms: 2_000,
        }
    }
}

impl LongboxConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: LongboxConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Defaults for everything but the library root.
    pub fn with_library_path(path: PathBuf) -> Self {
        Self {
            library: LibrarySection {
                path,
                name: default_library_name(),
            },
            scanner: ScannerSection::default(),
            thumbnails: ThumbnailSection::default(),
            monitoring: MonitoringSection::default(),
            data_dir: default_data_dir(),
        }
    }

    pub fn library_path(&self) -> &Path {
        &self.library.path
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("library.db")
    }

    pub fn thumbnails_dir(&self) -> PathBuf {
        self.data_dir.join("thumbnails")
    }

    /// Monitor settings for [`longbox_core::fs_watch::LibraryMonitor`].
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            batch_window: Duration::from_millis(self.monitoring.batch_window_ms),
            modified_debounce: Duration::from_millis(
                self.monitoring.modified_debounce_ms,
            ),
            ..MonitorConfig::default()
        }
    }

    /// A thumbnail service writing into this configuration's data dir.
    pub fn thumbnail_service(&self) -> ThumbnailService {
        ThumbnailService::new(
            self.thumbnails_dir(),
            self.thumbnails.width,
            self.thumbnails.height,
            self.thumbnails.quality,
        )
    }
}

fn default_library_name() -> String {
    "My Comic Library".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}
