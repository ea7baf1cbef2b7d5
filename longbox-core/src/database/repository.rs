//! Data access layer for the library index.
//!
//! Paths are stored relative to the library root; every public method
//! accepts and returns absolute paths and converts at the boundary, so
//! relocating the root requires changing one configuration value and
//! nothing stored. Upsert identity for folders and comics is the unique
//! relative path.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use longbox_model::{
    Comic, ComicFormat, ComicId, ComicMetadata, Folder, FolderId, MetadataPatch,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{LibraryError, Result};
use crate::paths;

const FOLDER_COLUMNS: &str = "id, name, path, parent_id, created_at";
const COMIC_COLUMNS: &str = "id, uuid, filename, path, format, file_size, \
     page_count, file_modified_at, last_synced_at, thumbnail_generated, \
     folder_id, created_at";

/// Everything needed to insert or refresh a comic row.
#[derive(Debug, Clone)]
pub struct ComicUpsert<'a> {
    pub folder_id: FolderId,
    pub path: &'a Path,
    pub filename: &'a str,
    pub format: ComicFormat,
    pub file_size: i64,
    pub page_count: i64,
    pub file_modified_at: DateTime<Utc>,
    pub thumbnail_generated: bool,
}

#[derive(Debug, Clone)]
pub struct LibraryRepository {
    pool: SqlitePool,
    library_root: PathBuf,
}

impl LibraryRepository {
    pub fn new(pool: SqlitePool, library_root: PathBuf) -> Self {
        Self { pool, library_root }
    }

    pub fn library_root(&self) -> &Path {
        &self.library_root
    }

    fn rel(&self, path: &Path) -> String {
        paths::to_relative(path, &self.library_root)
    }

    // --- Folders ---

    /// Look up or create the folder for an absolute path, materializing
    /// missing ancestors from the root downward. Idempotent.
    pub async fn get_or_create_folder(&self, path: &Path) -> Result<Folder> {
        let rel = self.rel(path);
        if let Some(folder) = self.folder_by_rel(&rel).await? {
            return Ok(folder);
        }

        let mut parent: Option<Folder> = None;
        for ancestor in ancestor_chain(&rel) {
            let folder = match self.folder_by_rel(&ancestor).await? {
                Some(existing) => existing,
                None => {
                    let name = self.folder_display_name(&ancestor);
                    self.insert_folder(&name, &ancestor, parent.as_ref().map(|f| f.id))
                        .await?
                }
            };
            parent = Some(folder);
        }

        parent.ok_or_else(|| {
            LibraryError::Internal(format!("empty folder chain for {rel}"))
        })
    }

    pub async fn folder_by_id(&self, id: FolderId) -> Result<Option<Folder>> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = ?");
        Ok(sqlx::query_as::<_, Folder>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn folder_by_path(&self, path: &Path) -> Result<Option<Folder>> {
        self.folder_by_rel(&self.rel(path)).await
    }

    /// True when the folder has at least one child folder (is not a leaf).
    pub async fn folder_has_subfolders(&self, id: FolderId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM folders WHERE parent_id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Folders at or under an absolute base path.
    pub async fn folders_under_path(&self, base: &Path) -> Result<Vec<Folder>> {
        let rel = self.rel(base);
        let rows = if rel == "." {
            let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders");
            sqlx::query_as::<_, Folder>(&sql)
                .fetch_all(&self.pool)
                .await?
        } else {
            let sql = format!(
                "SELECT {FOLDER_COLUMNS} FROM folders \
                 WHERE path = ? OR path LIKE ?"
            );
            sqlx::query_as::<_, Folder>(&sql)
                .bind(&rel)
                .bind(format!("{rel}/%"))
                .fetch_all(&self.pool)
                .await?
        };
        Ok(rows)
    }

    /// Delete a folder and its descendant folders.
    pub async fn delete_folder_by_path(&self, path: &Path) -> Result<()> {
        let rel = self.rel(path);
        sqlx::query("DELETE FROM folders WHERE path = ? OR path LIKE ?")
            .bind(&rel)
            .bind(format!("{rel}/%"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move a folder: rewrite its own path/name/parent and every
    /// descendant folder's and comic's path by prefix substitution, as
    /// one transaction. Returns false when the source folder is unknown.
    pub async fn move_folder(&self, old: &Path, new: &Path) -> Result<bool> {
        let old_rel = self.rel(old);
        let new_rel = self.rel(new);

        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE path = ?");
        let Some(folder) = sqlx::query_as::<_, Folder>(&sql)
            .bind(&old_rel)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(false);
        };

        let parent_rel = new
            .parent()
            .map(|p| self.rel(p))
            .unwrap_or_else(|| ".".to_string());
        let parent_id: Option<FolderId> =
            sqlx::query_scalar("SELECT id FROM folders WHERE path = ?")
                .bind(&parent_rel)
                .fetch_optional(&mut *tx)
                .await?;

        let name = new
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| new_rel.clone());

        sqlx::query("UPDATE folders SET path = ?, name = ?, parent_id = ? WHERE id = ?")
            .bind(&new_rel)
            .bind(&name)
            .bind(parent_id)
            .bind(folder.id)
            .execute(&mut *tx)
            .await?;

        // substr() counts characters, so the offset must too.
        let tail_start = (old_rel.chars().count() + 1) as i64;
        let like = format!("{old_rel}/%");

        sqlx::query("UPDATE folders SET path = ? || substr(path, ?) WHERE path LIKE ?")
            .bind(&new_rel)
            .bind(tail_start)
            .bind(&like)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE comics SET path = ? || substr(path, ?) WHERE path LIKE ?")
            .bind(&new_rel)
            .bind(tail_start)
            .bind(&like)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    // --- Comics ---

    /// Insert or refresh a comic at its relative path.
    ///
    /// Inserts assign the externally exposed uuid exactly once and create
    /// the (empty) metadata row alongside; updates leave both alone.
    pub async fn upsert_comic(&self, upsert: ComicUpsert<'_>) -> Result<Comic> {
        let rel = self.rel(upsert.path);
        let now = Utc::now();

        if let Some(existing) = self.comic_by_rel(&rel).await? {
            let sql = format!(
                "UPDATE comics SET folder_id = ?, filename = ?, format = ?, \
                 file_size = ?, page_count = ?, file_modified_at = ?, \
                 last_synced_at = ?, thumbnail_generated = ? \
                 WHERE id = ? RETURNING {COMIC_COLUMNS}"
            );
            let comic = sqlx::query_as::<_, Comic>(&sql)
                .bind(upsert.folder_id)
                .bind(upsert.filename)
                .bind(upsert.format)
                .bind(upsert.file_size)
                .bind(upsert.page_count)
                .bind(upsert.file_modified_at)
                .bind(now)
                .bind(upsert.thumbnail_generated)
                .bind(existing.id)
                .fetch_one(&self.pool)
                .await?;
            Ok(comic)
        } else {
            let sql = format!(
                "INSERT INTO comics (uuid, filename, path, format, file_size, \
                 page_count, file_modified_at, last_synced_at, \
                 thumbnail_generated, folder_id, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 RETURNING {COMIC_COLUMNS}"
            );
            let comic = sqlx::query_as::<_, Comic>(&sql)
                .bind(Uuid::new_v4())
                .bind(upsert.filename)
                .bind(&rel)
                .bind(upsert.format)
                .bind(upsert.file_size)
                .bind(upsert.page_count)
                .bind(upsert.file_modified_at)
                .bind(now)
                .bind(upsert.thumbnail_generated)
                .bind(upsert.folder_id)
                .bind(now)
                .fetch_one(&self.pool)
                .await
                .map_err(|err| map_unique(err, &rel))?;

            sqlx::query("INSERT INTO comic_metadata (comic_id) VALUES (?)")
                .bind(comic.id)
                .execute(&self.pool)
                .await?;

            Ok(comic)
        }
    }

    pub async fn comic_by_path(&self, path: &Path) -> Result<Option<Comic>> {
        self.comic_by_rel(&self.rel(path)).await
    }

    pub async fn comic_by_id(&self, id: ComicId) -> Result<Option<Comic>> {
        let sql = format!("SELECT {COMIC_COLUMNS} FROM comics WHERE id = ?");
        Ok(sqlx::query_as::<_, Comic>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn comic_by_uuid(&self, uuid: Uuid) -> Result<Option<Comic>> {
        let sql = format!("SELECT {COMIC_COLUMNS} FROM comics WHERE uuid = ?");
        Ok(sqlx::query_as::<_, Comic>(&sql)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Comics whose relative path lies strictly under an absolute base.
    pub async fn comics_under_path(&self, base: &Path) -> Result<Vec<Comic>> {
        let rel = self.rel(base);
        let rows = if rel == "." {
            let sql = format!("SELECT {COMIC_COLUMNS} FROM comics");
            sqlx::query_as::<_, Comic>(&sql)
                .fetch_all(&self.pool)
                .await?
        } else {
            let sql =
                format!("SELECT {COMIC_COLUMNS} FROM comics WHERE path LIKE ?");
            sqlx::query_as::<_, Comic>(&sql)
                .bind(format!("{rel}/%"))
                .fetch_all(&self.pool)
                .await?
        };
        Ok(rows)
    }

    pub async fn comics_missing_thumbnails(&self) -> Result<Vec<Comic>> {
        let sql = format!(
            "SELECT {COMIC_COLUMNS} FROM comics WHERE thumbnail_generated = 0"
        );
        Ok(sqlx::query_as::<_, Comic>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn all_comic_uuids(&self) -> Result<Vec<Uuid>> {
        Ok(sqlx::query_scalar("SELECT uuid FROM comics")
            .fetch_all(&self.pool)
            .await?)
    }

    /// Delete the comic at an absolute path, returning the uuids of the
    /// removed rows for thumbnail cleanup.
    pub async fn delete_comic_by_path(&self, path: &Path) -> Result<Vec<Uuid>> {
        let rel = self.rel(path);
        let uuids: Vec<Uuid> =
            sqlx::query_scalar("SELECT uuid FROM comics WHERE path = ?")
                .bind(&rel)
                .fetch_all(&self.pool)
                .await?;
        sqlx::query("DELETE FROM comics WHERE path = ?")
            .bind(&rel)
            .execute(&self.pool)
            .await?;
        Ok(uuids)
    }

    /// Delete every comic under an absolute base path, returning uuids.
    pub async fn delete_comics_under_path(&self, base: &Path) -> Result<Vec<Uuid>> {
        let rel = self.rel(base);
        let like = format!("{rel}/%");
        let uuids: Vec<Uuid> =
            sqlx::query_scalar("SELECT uuid FROM comics WHERE path LIKE ?")
                .bind(&like)
                .fetch_all(&self.pool)
                .await?;
        sqlx::query("DELETE FROM comics WHERE path LIKE ?")
            .bind(&like)
            .execute(&self.pool)
            .await?;
        Ok(uuids)
    }

    /// Rewrite a single comic's location after a file move. Returns false
    /// when the source path is unknown.
    pub async fn move_comic(
        &self,
        old: &Path,
        new: &Path,
        new_folder: FolderId,
    ) -> Result<bool> {
        let filename = new
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = sqlx::query(
            "UPDATE comics SET path = ?, filename = ?, folder_id = ? WHERE path = ?",
        )
        .bind(self.rel(new))
        .bind(filename)
        .bind(new_folder)
        .bind(self.rel(old))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_thumbnail_generated(
        &self,
        id: ComicId,
        generated: bool,
    ) -> Result<()> {
        sqlx::query("UPDATE comics SET thumbnail_generated = ? WHERE id = ?")
            .bind(generated)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // --- Metadata ---

    /// True when the metadata row for a comic exists, i.e. the comic has
    /// been processed at least once.
    pub async fn has_metadata(&self, id: ComicId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comic_metadata WHERE comic_id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn metadata_by_comic(
        &self,
        id: ComicId,
    ) -> Result<Option<ComicMetadata>> {
        Ok(sqlx::query_as::<_, ComicMetadata>(
            "SELECT comic_id, title, series, issue_number, publisher, year, \
             month, writer, penciller, artist, summary, notes, web, \
             language_iso, genre, score, is_completed, current_page, \
             last_read_at FROM comic_metadata WHERE comic_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Additive metadata merge: only fields the patch supplies overwrite
    /// the stored row; everything else keeps its value.
    pub async fn update_comic_metadata(
        &self,
        id: ComicId,
        patch: &MetadataPatch,
    ) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO comic_metadata (comic_id) VALUES (?)")
            .bind(id)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "UPDATE comic_metadata SET \
             series = COALESCE(?, series), \
             title = COALESCE(?, title), \
             issue_number = COALESCE(?, issue_number), \
             publisher = COALESCE(?, publisher), \
             year = COALESCE(?, year), \
             month = COALESCE(?, month), \
             writer = COALESCE(?, writer), \
             penciller = COALESCE(?, penciller), \
             summary = COALESCE(?, summary), \
             notes = COALESCE(?, notes), \
             web = COALESCE(?, web), \
             language_iso = COALESCE(?, language_iso), \
             genre = COALESCE(?, genre) \
             WHERE comic_id = ?",
        )
        .bind(&patch.series)
        .bind(&patch.title)
        .bind(patch.issue_number)
        .bind(&patch.publisher)
        .bind(patch.year)
        .bind(patch.month)
        .bind(&patch.writer)
        .bind(&patch.penciller)
        .bind(&patch.summary)
        .bind(&patch.notes)
        .bind(&patch.web)
        .bind(&patch.language_iso)
        .bind(&patch.genre)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- internals ---

    async fn folder_by_rel(&self, rel: &str) -> Result<Option<Folder>> {
        let sql = format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE path = ?");
        Ok(sqlx::query_as::<_, Folder>(&sql)
            .bind(rel)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn comic_by_rel(&self, rel: &str) -> Result<Option<Comic>> {
        let sql = format!("SELECT {COMIC_COLUMNS} FROM comics WHERE path = ?");
        Ok(sqlx::query_as::<_, Comic>(&sql)
            .bind(rel)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_folder(
        &self,
        name: &str,
        rel: &str,
        parent_id: Option<FolderId>,
    ) -> Result<Folder> {
        let sql = format!(
            "INSERT INTO folders (name, path, parent_id, created_at) \
             VALUES (?, ?, ?, ?) RETURNING {FOLDER_COLUMNS}"
        );
        sqlx::query_as::<_, Folder>(&sql)
            .bind(name)
            .bind(rel)
            .bind(parent_id)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|err| map_unique(err, rel))
    }

    fn folder_display_name(&self, rel: &str) -> String {
        if rel == "." {
            self.library_root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.library_root.display().to_string())
        } else {
            rel.rsplit('/').next().unwrap_or(rel).to_string()
        }
    }
}

/// Relative-path prefixes from the root (`"."`) down to `rel` itself.
fn ancestor_chain(rel: &str) -> Vec<String> {
    let mut chain = vec![".".to_string()];
    if rel != "." {
        let mut prefix = String::new();
        for segment in rel.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            chain.push(prefix.clone());
        }
    }
    chain
}

/// A unique-key collision means another writer touched the index, which
/// the single-writer discipline rules out.
fn map_unique(err: sqlx::Error, what: &str) -> LibraryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            LibraryError::PersistenceConflict(format!(
                "concurrent insert for {what}"
            ))
        }
        _ => LibraryError::Database(err),
    }
}
