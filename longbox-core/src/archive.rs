//! Archive access for comic containers.
//!
//! CBZ (zip) and CBR (rar) archives are read through the [`ComicArchive`]
//! trait. The format is selected by file extension; when the indicated
//! format fails to open, the other one is probed before giving up, which
//! tolerates misnamed files. Handles release their resources on drop.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use longbox_model::ComicFormat;
use tracing::debug;
use unrar::Archive as RarFile;

use crate::error::{LibraryError, Result};

/// Entry extensions treated as page images.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// True when an entry name looks like a page image.
pub fn is_page_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        })
}

/// Uniform read access to an opened comic archive.
pub trait ComicArchive: Send {
    /// Entry names that look like page images, in archive order.
    fn page_images(&mut self) -> Result<Vec<String>>;

    /// Every entry name in the archive (for locating sidecar files).
    fn entry_names(&mut self) -> Result<Vec<String>>;

    /// Read one entry's bytes by name.
    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>>;
}

/// Open a comic archive, probing the other format on failure.
///
/// `NotFound` when the file is missing, `UnsupportedFormat` when the
/// extension names neither container; an open error surfaces only after
/// both formats have been attempted.
pub fn open_archive(path: &Path) -> Result<Box<dyn ComicArchive>> {
    if !path.exists() {
        return Err(LibraryError::NotFound(path.display().to_string()));
    }

    let format = ComicFormat::from_path(path).ok_or_else(|| {
        LibraryError::UnsupportedFormat(path.display().to_string())
    })?;
    let (primary, fallback) = match format {
        ComicFormat::Cbz => (ComicFormat::Cbz, ComicFormat::Cbr),
        ComicFormat::Cbr => (ComicFormat::Cbr, ComicFormat::Cbz),
    };

    match open_as(primary, path) {
        Ok(archive) => Ok(archive),
        Err(err) => {
            debug!(
                "{} failed to open as {primary}: {err}; probing {fallback}",
                path.display()
            );
            open_as(fallback, path)
        }
    }
}

fn open_as(format: ComicFormat, path: &Path) -> Result<Box<dyn ComicArchive>> {
    match format {
        ComicFormat::Cbz => {
            ZipComicArchive::open(path).map(|a| Box::new(a) as Box<dyn ComicArchive>)
        }
        ComicFormat::Cbr => {
            RarComicArchive::open(path).map(|a| Box::new(a) as Box<dyn ComicArchive>)
        }
    }
}

/// Zip-backed comic archive.
pub struct ZipComicArchive {
    archive: zip::ZipArchive<File>,
}

impl std::fmt::Debug for ZipComicArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipComicArchive")
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl ZipComicArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let archive = zip::ZipArchive::new(file).map_err(|err| {
            LibraryError::CorruptArchive(format!("{}: {err}", path.display()))
        })?;
        Ok(Self { archive })
    }
}

impl ComicArchive for ZipComicArchive {
    fn page_images(&mut self) -> Result<Vec<String>> {
        Ok(self
            .archive
            .file_names()
            .filter(|name| is_page_image(name))
            .map(str::to_owned)
            .collect())
    }

    fn entry_names(&mut self) -> Result<Vec<String>> {
        Ok(self.archive.file_names().map(str::to_owned).collect())
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self.archive.by_name(name).map_err(|err| match err {
            zip::result::ZipError::FileNotFound => {
                LibraryError::NotFound(name.to_string())
            }
            other => LibraryError::CorruptArchive(other.to_string()),
        })?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Rar-backed comic archive.
///
/// The rar reader is sequential, so entry names are collected once at
/// open and a named read re-walks the archive up to the wanted entry.
#[derive(Debug)]
pub struct RarComicArchive {
    path: PathBuf,
    names: Vec<String>,
}

impl RarComicArchive {
    pub fn open(path: &Path) -> Result<Self> {
        let listing = RarFile::new(path).open_for_listing().map_err(|err| {
            LibraryError::CorruptArchive(format!("{}: {err}", path.display()))
        })?;

        let mut names = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|err| {
                LibraryError::CorruptArchive(format!("{}: {err}", path.display()))
            })?;
            if entry.is_file() {
                names.push(entry.filename.to_string_lossy().into_owned());
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            names,
        })
    }
}

impl ComicArchive for RarComicArchive {
    fn page_images(&mut self) -> Result<Vec<String>> {
        Ok(self
            .names
            .iter()
            .filter(|name| is_page_image(name))
            .cloned()
            .collect())
    }

    fn entry_names(&mut self) -> Result<Vec<String>> {
        Ok(self.names.clone())
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut archive =
            RarFile::new(&self.path).open_for_processing().map_err(|err| {
                LibraryError::CorruptArchive(format!(
                    "{}: {err}",
                    self.path.display()
                ))
            })?;

        while let Some(cursor) = archive.read_header().map_err(|err| {
            LibraryError::CorruptArchive(format!("{}: {err}", self.path.display()))
        })? {
            if cursor.entry().filename.to_string_lossy() == name {
                let (data, _rest) = cursor.read().map_err(|err| {
                    LibraryError::CorruptArchive(format!(
                        "{}: {err}",
                        self.path.display()
                    ))
                })?;
                return Ok(data);
            }
            archive = cursor.skip().map_err(|err| {
                LibraryError::CorruptArchive(format!(
                    "{}: {err}",
                    self.path.display()
                ))
            })?;
        }

        Err(LibraryError::NotFound(name.to_string()))
    }
}
