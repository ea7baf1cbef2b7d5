//! # Longbox Core
//!
//! Core library for Longbox, keeping a relational index of a comic
//! archive collection (CBZ/CBR) synchronized with the filesystem.
//!
//! ## Overview
//!
//! `longbox-core` provides:
//!
//! - **Archive access**: one trait over zip and rar containers, with
//!   extension-based selection and same-file fallback probing
//! - **Sidecar extraction**: typed, partial metadata from an embedded
//!   `ComicInfo.xml`
//! - **Index persistence**: SQLite-backed folder/comic/metadata storage
//!   keyed by root-relative paths
//! - **Thumbnails**: first-page extraction, bounded resize, JPEG output
//! - **Scan engine**: full and incremental reconciliation of a subtree
//!   against the index
//! - **Event monitor**: debounced, batched filesystem watching dispatched
//!   onto the scan engine
//!
//! ## Concurrency
//!
//! The index assumes a single owning process. Scan operations are async
//! but strictly sequential; the event monitor runs one consumer that
//! processes one batch at a time. A manual scan and the monitor must not
//! mutate the index concurrently - callers serialize them.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Archive access for comic containers
pub mod archive;

/// ComicInfo.xml sidecar extraction
pub mod comicinfo;

/// SQLite persistence and the library repository
pub mod database;

/// Error types and error handling utilities
pub mod error;

/// Live filesystem monitoring
pub mod fs_watch;

/// Absolute/relative path conversion against the library root
pub mod paths;

/// Library scan engine
pub mod scanner;

/// Thumbnail extraction pipeline
pub mod thumbnails;

pub use database::{LibraryRepository, MIGRATOR};
pub use error::{LibraryError, Result};
pub use fs_watch::{LibraryMonitor, MonitorConfig, MonitorTask};
pub use scanner::LibraryScanner;
pub use thumbnails::ThumbnailService;
