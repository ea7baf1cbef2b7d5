//! Core data model definitions shared across Longbox crates.
#![allow(missing_docs)]

pub mod comic;
pub mod folder;
pub mod format;
pub mod ids;
pub mod metadata;
pub mod scan;

pub use comic::Comic;
pub use folder::Folder;
pub use format::ComicFormat;
pub use ids::{ComicId, FolderId};
pub use metadata::{ComicMetadata, MetadataPatch};
pub use scan::ScanSummary;
