use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::ids::ComicId;

/// Descriptive and reading-progress metadata, one row per comic.
///
/// The row is created (empty) the first time a comic is processed, so
/// its presence doubles as a "has been processed" marker. `series` is
/// only ever derived from the containing folder's name, never from the
/// embedded sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ComicMetadata {
    pub comic_id: ComicId,
    pub title: Option<String>,
    pub series: Option<String>,
    pub issue_number: Option<i64>,
    pub publisher: Option<String>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub writer: Option<String>,
    pub penciller: Option<String>,
    pub artist: Option<String>,
    pub summary: Option<String>,
    pub notes: Option<String>,
    pub web: Option<String>,
    pub language_iso: Option<String>,
    pub genre: Option<String>,
    pub score: Option<i64>,
    // Reading progress (continue reading)
    pub is_completed: bool,
    /// 1-based page last viewed.
    pub current_page: Option<i64>,
    pub last_read_at: Option<DateTime<Utc>>,
}

/// Additive metadata update: only fields that are `Some` overwrite the
/// stored row, so a sparse extraction never clears earlier values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub series: Option<String>,
    pub title: Option<String>,
    pub issue_number: Option<i64>,
    pub publisher: Option<String>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub writer: Option<String>,
    pub penciller: Option<String>,
    pub summary: Option<String>,
    pub notes: Option<String>,
    pub web: Option<String>,
    pub language_iso: Option<String>,
    pub genre: Option<String>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
