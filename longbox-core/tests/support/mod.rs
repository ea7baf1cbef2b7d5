//! Shared fixtures: a temp library on disk backed by an in-memory index.
#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use longbox_core::database::{self, LibraryRepository};
use longbox_core::scanner::LibraryScanner;
use longbox_core::thumbnails::ThumbnailService;
use tempfile::TempDir;

pub struct TestLibrary {
    // Held for its Drop; removing the TempDir tears the library down.
    pub tmp: TempDir,
    pub root: PathBuf,
    pub repo: LibraryRepository,
    pub thumbnails: ThumbnailService,
    pub scanner: LibraryScanner,
}

/// `RUST_LOG=longbox_core=debug cargo test` to watch a scan work.
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn test_library() -> TestLibrary {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("library");
    fs::create_dir_all(&root).unwrap();

    let pool = database::connect_in_memory().await.unwrap();
    let repo = LibraryRepository::new(pool, root.clone());
    let thumbnails =
        ThumbnailService::new(tmp.path().join("thumbnails"), 120, 180, 80);
    let scanner = LibraryScanner::new(
        repo.clone(),
        thumbnails.clone(),
        vec![
            ".DS_Store".to_string(),
            "Thumbs.db".to_string(),
            "@eaDir".to_string(),
        ],
    );

    TestLibrary {
        tmp,
        root,
        repo,
        thumbnails,
        scanner,
    }
}

pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(10, 10, image::Rgb([200, 30, 30]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    bytes
}

/// Write a valid CBZ with `pages` numbered page images and an optional
/// ComicInfo.xml body.
pub fn write_comic(path: &Path, pages: usize, comicinfo: Option<&str>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }

    let file = File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    let png = tiny_png();

    for page in 1..=pages {
        writer
            .start_file(format!("{page:03}.png"), options)
            .unwrap();
        writer.write_all(&png).unwrap();
    }
    if let Some(xml) = comicinfo {
        writer.start_file("ComicInfo.xml", options).unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Push a file's mtime forward so an incremental scan sees a change
/// without the test having to sleep across a whole-second boundary.
pub fn bump_mtime(path: &Path, forward: Duration) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + forward).unwrap();
}
