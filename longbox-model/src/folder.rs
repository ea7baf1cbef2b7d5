use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::ids::FolderId;

/// A directory inside the library, addressed by its root-relative path.
///
/// Folders form a tree via `parent_id`; the library root itself is stored
/// as the folder with path `"."`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    /// Path relative to the library root, unique across the index.
    pub path: String,
    pub parent_id: Option<FolderId>,
    pub created_at: DateTime<Utc>,
}
