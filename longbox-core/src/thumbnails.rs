//! Thumbnail extraction pipeline.
//!
//! Pulls a representative page out of an archive, resizes it into a
//! bounded box, and writes a JPEG named by the comic's uuid. Every
//! failure is non-fatal: the comic is left without a thumbnail and
//! becomes eligible again on the next scan that processes it.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::open_archive;
use crate::database::LibraryRepository;
use crate::error::Result;
use crate::paths;

#[derive(Debug, Clone)]
pub struct ThumbnailService {
    dir: PathBuf,
    width: u32,
    height: u32,
    quality: u8,
}

impl ThumbnailService {
    pub fn new(dir: PathBuf, width: u32, height: u32, quality: u8) -> Self {
        Self {
            dir,
            width,
            height,
            quality,
        }
    }

    /// Where a comic's thumbnail lives, whether or not it exists yet.
    pub fn thumbnail_path(&self, uuid: Uuid) -> PathBuf {
        self.dir.join(format!("{uuid}.jpg"))
    }

    /// Generate (or regenerate) the thumbnail for one comic. Returns
    /// whether a thumbnail was written; failures are logged, not raised.
    pub fn generate(&self, uuid: Uuid, archive_path: &Path) -> bool {
        let Some(bytes) = first_page_bytes(archive_path) else {
            return false;
        };

        let dest = self.thumbnail_path(uuid);
        match self.encode(&bytes, &dest) {
            Ok(()) => {
                debug!("thumbnail written for {}", archive_path.display());
                true
            }
            Err(err) => {
                warn!(
                    "thumbnail encode failed for {}: {err}",
                    archive_path.display()
                );
                false
            }
        }
    }

    fn encode(&self, bytes: &[u8], dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let img = image::load_from_memory(bytes)?;
        // Bounded box, aspect ratio preserved.
        let thumb = img.thumbnail(self.width, self.height).into_rgb8();
        let mut out = BufWriter::new(File::create(dest)?);
        let encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        thumb.write_with_encoder(encoder)?;
        Ok(())
    }

    /// Remove the thumbnail files for deleted comics.
    pub fn remove(&self, uuids: &[Uuid]) {
        for uuid in uuids {
            let path = self.thumbnail_path(*uuid);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!("failed to remove {}: {err}", path.display()),
            }
        }
    }

    /// Delete thumbnail files that no longer belong to any indexed comic.
    /// Returns how many were removed.
    pub fn cleanup_orphans(&self, valid: &HashSet<Uuid>) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jpg") {
                continue;
            }
            let uuid = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<Uuid>().ok());
            let orphaned = uuid.is_none_or(|uuid| !valid.contains(&uuid));
            if orphaned {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(err) => {
                        warn!("failed to remove {}: {err}", path.display())
                    }
                }
            }
        }
        removed
    }

    /// Generate thumbnails for every indexed comic still missing one.
    pub async fn generate_missing(&self, repo: &LibraryRepository) -> Result<usize> {
        let pending = repo.comics_missing_thumbnails().await?;
        let total = pending.len();
        info!("{total} comics missing thumbnails");

        let mut generated = 0;
        for comic in pending {
            let path = paths::to_absolute(&comic.path, repo.library_root());
            if !path.exists() {
                warn!("comic file not on disk: {}", path.display());
                continue;
            }
            if self.generate(comic.uuid, &path) {
                repo.set_thumbnail_generated(comic.id, true).await?;
                generated += 1;
            }
        }
        Ok(generated)
    }
}

/// First page by plain lexicographic entry-name order. Natural numeric
/// ordering is what page readers want, but for the conventional first
/// page the cheap sort is enough.
fn first_page_bytes(archive_path: &Path) -> Option<Vec<u8>> {
    let mut archive = match open_archive(archive_path) {
        Ok(archive) => archive,
        Err(err) => {
            warn!("unable to open {}: {err}", archive_path.display());
            return None;
        }
    };

    let mut images = match archive.page_images() {
        Ok(images) => images,
        Err(err) => {
            warn!("unable to list {}: {err}", archive_path.display());
            return None;
        }
    };
    if images.is_empty() {
        warn!("no page images in {}", archive_path.display());
        return None;
    }
    images.sort();

    match archive.read_entry(&images[0]) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(
                "unable to read {} from {}: {err}",
                images[0],
                archive_path.display()
            );
            None
        }
    }
}
