//! Library scan engine.
//!
//! Walks a subtree of the library (or all of it), reconciles what is on
//! disk against the index, and reports a change summary. Runs strictly
//! sequentially on the invoking task; per-file failures are logged and
//! counted, never propagated out of a walk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use longbox_model::{ComicFormat, Folder, FolderId, MetadataPatch, ScanSummary};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::open_archive;
use crate::comicinfo::{self, ComicInfo};
use crate::database::{ComicUpsert, LibraryRepository};
use crate::error::{LibraryError, Result};
use crate::paths;
use crate::thumbnails::ThumbnailService;

/// True if the path looks like a supported comic archive.
pub fn is_comic_file(path: &Path) -> bool {
    ComicFormat::from_path(path).is_some()
}

enum Outcome {
    Added,
    Updated,
    Skipped,
}

/// Reconciles the filesystem into the index.
///
/// One scanner mutating the index at a time: a manual scan and the
/// monitor's dispatched tasks must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct LibraryScanner {
    repo: LibraryRepository,
    thumbnails: ThumbnailService,
    ignore_patterns: Vec<String>,
}

impl LibraryScanner {
    pub fn new(
        repo: LibraryRepository,
        thumbnails: ThumbnailService,
        ignore_patterns: Vec<String>,
    ) -> Self {
        Self {
            repo,
            thumbnails,
            ignore_patterns,
        }
    }

    pub fn repository(&self) -> &LibraryRepository {
        &self.repo
    }

    pub fn ignore_patterns(&self) -> &[String] {
        &self.ignore_patterns
    }

    fn entry_ignored(&self, entry: &walkdir::DirEntry) -> bool {
        entry.depth() > 0
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| is_ignored(name, &self.ignore_patterns))
    }

    /// Scan the whole library or a named subtree and sync the index.
    ///
    /// `force` bypasses the incremental skip decision. Only setup
    /// failures (missing base path, unreachable index) return an error.
    pub async fn scan(
        &self,
        subpath: Option<&Path>,
        force: bool,
    ) -> Result<ScanSummary> {
        let root = self.repo.library_root().to_path_buf();
        let base = subpath.map(Path::to_path_buf).unwrap_or_else(|| root.clone());
        if !base.exists() {
            return Err(LibraryError::NotFound(format!(
                "library path does not exist: {}",
                base.display()
            )));
        }

        let mut summary = ScanSummary::default();
        let mut processed: HashSet<String> = HashSet::new();
        let mut folders: HashMap<PathBuf, Folder> = HashMap::new();

        let walker = WalkDir::new(&base)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !self.entry_ignored(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("walk error: {err}");
                    continue;
                }
            };
            let path = entry.path();

            if entry.file_type().is_dir() {
                let folder = self.repo.get_or_create_folder(path).await?;
                info!("[scan] {}", paths::to_relative(path, &root));
                folders.insert(path.to_path_buf(), folder);
                continue;
            }

            if !is_comic_file(path) {
                continue;
            }

            let parent = path.parent().unwrap_or(&base);
            let folder_id = match folders.get(parent) {
                Some(folder) => folder.id,
                None => self.repo.get_or_create_folder(parent).await?.id,
            };

            processed.insert(paths::to_relative(path, &root));
            match self.process_comic(path, folder_id, force).await? {
                Outcome::Added => summary.added += 1,
                Outcome::Updated => summary.updated += 1,
                Outcome::Skipped => summary.skipped += 1,
            }
        }

        // Reconcile deletions: indexed comics under the subtree that were
        // not freshly processed and are gone from disk, then folders whose
        // directories vanished.
        for comic in self.repo.comics_under_path(&base).await? {
            let abs = paths::to_absolute(&comic.path, &root);
            if !processed.contains(&comic.path) && !abs.exists() {
                let uuids = self.repo.delete_comic_by_path(&abs).await?;
                self.thumbnails.remove(&uuids);
                summary.deleted += 1;
            }
        }
        for folder in self.repo.folders_under_path(&base).await? {
            let abs = paths::to_absolute(&folder.path, &root);
            if !abs.exists() {
                self.repo.delete_folder_by_path(&abs).await?;
            }
        }

        info!("scan of {} complete: {summary}", base.display());
        Ok(summary)
    }

    /// Scan a single comic file (monitor primitive).
    pub async fn scan_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let parent = path.parent().unwrap_or(self.repo.library_root());
        let folder = self.repo.get_or_create_folder(parent).await?;
        self.process_comic(path, folder.id, false).await?;
        Ok(())
    }

    /// Scan a folder that appeared on disk (monitor primitive).
    pub async fn scan_folder(&self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Ok(());
        }

        let mut comic_files = Vec::new();
        for entry in WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| !self.entry_ignored(entry))
        {
            let Ok(entry) = entry else { continue };
            if entry.file_type().is_file() && is_comic_file(entry.path()) {
                comic_files.push(entry.path().to_path_buf());
            }
        }
        if comic_files.is_empty() {
            return Ok(());
        }

        info!(
            "[+] new folder: {} ({} files)",
            paths::to_relative(path, self.repo.library_root()),
            comic_files.len()
        );
        for file in comic_files {
            let parent = file.parent().unwrap_or(path);
            let folder = self.repo.get_or_create_folder(parent).await?;
            self.process_comic(&file, folder.id, false).await?;
        }
        Ok(())
    }

    /// Remove a deleted file or folder from the index (monitor primitive).
    pub async fn delete_path(&self, path: &Path) -> Result<()> {
        // The path is usually gone by the time we run; a non-comic
        // extension on a missing path means it was a folder.
        let treat_as_folder =
            path.is_dir() || (!path.exists() && !is_comic_file(path));

        if treat_as_folder {
            let uuids = self.repo.delete_comics_under_path(path).await?;
            self.repo.delete_folder_by_path(path).await?;
            self.thumbnails.remove(&uuids);
            info!(
                "[-] removed folder: {} ({} comics)",
                paths::to_relative(path, self.repo.library_root()),
                uuids.len()
            );
        } else {
            let uuids = self.repo.delete_comic_by_path(path).await?;
            self.thumbnails.remove(&uuids);
            if !uuids.is_empty() {
                info!("[-] removed: {}", path.display());
            }
        }
        Ok(())
    }

    /// Apply a move/rename to the index (monitor primitive).
    pub async fn move_path(&self, src: &Path, dest: &Path) -> Result<()> {
        let is_folder = if dest.exists() {
            dest.is_dir()
        } else {
            !is_comic_file(src)
        };

        let root = self.repo.library_root().to_path_buf();

        if is_folder {
            if let Some(parent) = dest.parent() {
                self.repo.get_or_create_folder(parent).await?;
            }
            if self.repo.move_folder(src, dest).await? {
                info!(
                    "[>] moved folder: {} -> {}",
                    paths::to_relative(src, &root),
                    paths::to_relative(dest, &root)
                );
            } else {
                // Source was never indexed; treat the destination as new.
                self.scan_folder(dest).await?;
            }
        } else {
            if !is_comic_file(dest) {
                return Ok(());
            }
            let parent = dest.parent().unwrap_or(&root);
            let folder = self.repo.get_or_create_folder(parent).await?;
            if self.repo.comic_by_path(src).await?.is_some() {
                self.repo.move_comic(src, dest, folder.id).await?;
                info!(
                    "[>] moved: {} -> {}",
                    paths::to_relative(src, &root),
                    paths::to_relative(dest, &root)
                );
            } else {
                self.process_comic(dest, folder.id, false).await?;
            }
        }
        Ok(())
    }

    /// Process one comic file: skip decision, validation, upsert,
    /// thumbnail, sidecar merge.
    async fn process_comic(
        &self,
        path: &Path,
        folder_id: FolderId,
        force: bool,
    ) -> Result<Outcome> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                // Transient stat failure: skip this cycle, the next scan
                // re-evaluates the file.
                warn!("unable to stat {}: {err}", path.display());
                return Ok(Outcome::Skipped);
            }
        };
        let file_mtime = file_mtime(&metadata);
        let file_size = metadata.len() as i64;

        let existing = self.repo.comic_by_path(path).await?;
        let was_existing = existing.is_some();

        // Skip only when all hold: already indexed, mtime unchanged,
        // metadata row present (processed before), and no forced rescan.
        if let Some(comic) = &existing
            && !force
            && comic.file_modified_at == file_mtime
        {
            let processed_before = self.repo.has_metadata(comic.id).await?;
            if processed_before {
                return Ok(Outcome::Skipped);
            }
        }

        let page_count = match validate_and_count_pages(path) {
            Ok(count) => count,
            Err(err) => {
                warn!("[x] {} is corrupt: {err}", path.display());
                if was_existing {
                    let uuids = self.repo.delete_comic_by_path(path).await?;
                    self.thumbnails.remove(&uuids);
                }
                return Ok(Outcome::Skipped);
            }
        };

        let format = ComicFormat::from_path(path).ok_or_else(|| {
            LibraryError::UnsupportedFormat(path.display().to_string())
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let thumbnail_generated = existing
            .as_ref()
            .map(|comic| comic.thumbnail_generated)
            .unwrap_or(false);

        let comic = self
            .repo
            .upsert_comic(ComicUpsert {
                folder_id,
                path,
                filename: &filename,
                format,
                file_size,
                page_count: page_count as i64,
                file_modified_at: file_mtime,
                thumbnail_generated,
            })
            .await?;

        if self.thumbnails.generate(comic.uuid, path) {
            self.repo.set_thumbnail_generated(comic.id, true).await?;
        }

        // Sidecar merge. Series comes from the containing folder's name,
        // and only while that folder is a leaf; never from the sidecar.
        let info = read_comicinfo(path);
        let is_leaf = !self.repo.folder_has_subfolders(folder_id).await?;
        let series = if is_leaf {
            path.parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
        } else {
            None
        };

        let mut patch = MetadataPatch::from(info);
        patch.series = series;
        if !patch.is_empty() {
            self.repo.update_comic_metadata(comic.id, &patch).await?;
        }

        debug!("{} ({page_count} pages)", path.display());
        Ok(if was_existing {
            Outcome::Updated
        } else {
            Outcome::Added
        })
    }
}

impl From<ComicInfo> for MetadataPatch {
    fn from(info: ComicInfo) -> Self {
        MetadataPatch {
            series: None,
            title: info.title,
            issue_number: info.issue_number,
            publisher: info.publisher,
            year: info.year,
            month: info.month,
            writer: info.writer,
            penciller: info.penciller,
            summary: info.summary,
            notes: info.notes,
            web: info.web,
            language_iso: info.language_iso,
            genre: info.genre,
        }
    }
}

/// Open the archive and count its page images; any failure here marks
/// the file corrupt.
fn validate_and_count_pages(path: &Path) -> Result<usize> {
    let mut archive = open_archive(path)?;
    Ok(archive.page_images()?.len())
}

fn read_comicinfo(path: &Path) -> ComicInfo {
    match open_archive(path) {
        Ok(mut archive) => comicinfo::read_from_archive(archive.as_mut()),
        Err(err) => {
            debug!("sidecar open failed for {}: {err}", path.display());
            ComicInfo::default()
        }
    }
}

/// Name-based ignore check: macOS resource forks plus the configured
/// ignore names.
pub fn is_ignored(name: &str, patterns: &[String]) -> bool {
    name.starts_with("._") || patterns.iter().any(|pattern| pattern == name)
}

/// Filesystem mtime truncated to whole seconds, so the stored value
/// compares exactly against a fresh stat.
fn file_mtime(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .ok()
        .and_then(|mtime| mtime.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|elapsed| DateTime::from_timestamp(elapsed.as_secs() as i64, 0))
        .unwrap_or_else(Utc::now)
}
