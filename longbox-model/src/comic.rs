use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::format::ComicFormat;
use crate::ids::{ComicId, FolderId};

/// An indexed comic archive.
///
/// `uuid` is the externally exposed identifier: assigned once when the
/// file is first discovered, never reused, and stable across renames and
/// moves. `path` is the root-relative location and the upsert identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Comic {
    pub id: ComicId,
    pub uuid: Uuid,
    pub filename: String,
    /// Path relative to the library root, unique across the index.
    pub path: String,
    pub format: ComicFormat,
    pub file_size: i64,
    pub page_count: i64,
    /// Source file's last-modified timestamp, truncated to whole seconds.
    pub file_modified_at: DateTime<Utc>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub thumbnail_generated: bool,
    pub folder_id: FolderId,
    pub created_at: DateTime<Utc>,
}
