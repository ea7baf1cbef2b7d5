//! Scan engine behaviour against a real on-disk library.

mod support;

use std::fs;
use std::time::Duration;

use longbox_model::ComicFormat;
use support::{bump_mtime, test_library, write_comic};

const XMEN_INFO: &str = r#"<?xml version="1.0"?>
<ComicInfo>
  <Title>Days of Future Past</Title>
  <Series>Should Never Be Used</Series>
  <Issue>141</Issue>
  <Writer>Chris Claremont</Writer>
</ComicInfo>"#;

#[tokio::test]
async fn full_scan_indexes_library() {
    let lib = test_library().await;
    write_comic(&lib.root.join("Marvel/X-Men/141.cbz"), 3, Some(XMEN_INFO));
    write_comic(&lib.root.join("Marvel/X-Men/142.cbz"), 2, None);
    write_comic(&lib.root.join("one-shot.cbz"), 1, None);

    let summary = lib.scanner.scan(None, false).await.unwrap();
    assert_eq!(summary.added, 3);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.skipped, 0);

    // Folder tree: root -> Marvel -> X-Men, keyed by relative path.
    let root_folder = lib.repo.folder_by_path(&lib.root).await.unwrap().unwrap();
    assert_eq!(root_folder.path, ".");
    let marvel = lib
        .repo
        .folder_by_path(&lib.root.join("Marvel"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(marvel.parent_id, Some(root_folder.id));
    let xmen = lib
        .repo
        .folder_by_path(&lib.root.join("Marvel/X-Men"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(xmen.parent_id, Some(marvel.id));

    let comic = lib
        .repo
        .comic_by_path(&lib.root.join("Marvel/X-Men/141.cbz"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(comic.path, "Marvel/X-Men/141.cbz");
    assert_eq!(comic.format, ComicFormat::Cbz);
    assert_eq!(comic.page_count, 3);
    assert_eq!(comic.folder_id, xmen.id);
    assert!(comic.last_synced_at.is_some());
    assert!(comic.thumbnail_generated);
    assert!(lib.thumbnails.thumbnail_path(comic.uuid).exists());

    // Sidecar fields merge, but series comes from the leaf folder name,
    // never from the sidecar's <Series>.
    let metadata = lib
        .repo
        .metadata_by_comic(comic.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metadata.title.as_deref(), Some("Days of Future Past"));
    assert_eq!(metadata.issue_number, Some(141));
    assert_eq!(metadata.writer.as_deref(), Some("Chris Claremont"));
    assert_eq!(metadata.series.as_deref(), Some("X-Men"));
}

#[tokio::test]
async fn rescan_of_unchanged_library_skips_everything() {
    let lib = test_library().await;
    write_comic(&lib.root.join("Series/a.cbz"), 1, None);
    write_comic(&lib.root.join("Series/b.cbz"), 1, None);

    lib.scanner.scan(None, false).await.unwrap();
    let summary = lib.scanner.scan(None, false).await.unwrap();

    assert_eq!(summary.added, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.skipped, 2);
}

#[tokio::test]
async fn forced_rescan_reprocesses_and_keeps_identity() {
    let lib = test_library().await;
    let path = lib.root.join("Series/a.cbz");
    write_comic(&path, 1, None);

    lib.scanner.scan(None, false).await.unwrap();
    let before = lib.repo.comic_by_path(&path).await.unwrap().unwrap();

    let summary = lib.scanner.scan(None, true).await.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped, 0);

    let after = lib.repo.comic_by_path(&path).await.unwrap().unwrap();
    assert_eq!(after.uuid, before.uuid);
    assert_eq!(after.id, before.id);
}

#[tokio::test]
async fn modified_file_is_reprocessed() {
    let lib = test_library().await;
    let path = lib.root.join("Series/a.cbz");
    write_comic(&path, 1, None);
    lib.scanner.scan(None, false).await.unwrap();

    write_comic(&path, 4, None);
    bump_mtime(&path, Duration::from_secs(10));

    let summary = lib.scanner.scan(None, false).await.unwrap();
    assert_eq!(summary.updated, 1);

    let comic = lib.repo.comic_by_path(&path).await.unwrap().unwrap();
    assert_eq!(comic.page_count, 4);
}

#[tokio::test]
async fn deleted_file_is_reconciled_with_thumbnail() {
    let lib = test_library().await;
    let path = lib.root.join("Series/a.cbz");
    write_comic(&path, 1, None);
    write_comic(&lib.root.join("Series/b.cbz"), 1, None);

    lib.scanner.scan(None, false).await.unwrap();
    let comic = lib.repo.comic_by_path(&path).await.unwrap().unwrap();
    let thumb = lib.thumbnails.thumbnail_path(comic.uuid);
    assert!(thumb.exists());

    fs::remove_file(&path).unwrap();
    let summary = lib.scanner.scan(None, false).await.unwrap();

    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.skipped, 1);
    assert!(lib.repo.comic_by_path(&path).await.unwrap().is_none());
    assert!(!thumb.exists());
}

#[tokio::test]
async fn deleted_folder_is_reconciled() {
    let lib = test_library().await;
    write_comic(&lib.root.join("Gone/a.cbz"), 1, None);
    write_comic(&lib.root.join("Gone/b.cbz"), 1, None);
    write_comic(&lib.root.join("Kept/c.cbz"), 1, None);

    lib.scanner.scan(None, false).await.unwrap();
    fs::remove_dir_all(lib.root.join("Gone")).unwrap();

    let summary = lib.scanner.scan(None, false).await.unwrap();
    assert_eq!(summary.deleted, 2);
    assert!(
        lib.repo
            .folder_by_path(&lib.root.join("Gone"))
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        lib.repo
            .folder_by_path(&lib.root.join("Kept"))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn corrupt_archive_is_dropped_from_index() {
    let lib = test_library().await;
    let path = lib.root.join("Series/a.cbz");
    write_comic(&path, 2, None);

    lib.scanner.scan(None, false).await.unwrap();
    let comic = lib.repo.comic_by_path(&path).await.unwrap().unwrap();
    let thumb = lib.thumbnails.thumbnail_path(comic.uuid);
    assert!(thumb.exists());

    fs::write(&path, b"no longer a zip archive").unwrap();
    bump_mtime(&path, Duration::from_secs(10));

    let summary = lib.scanner.scan(None, false).await.unwrap();
    assert!(summary.skipped >= 1);
    assert!(lib.repo.comic_by_path(&path).await.unwrap().is_none());
    assert!(!thumb.exists());
}

#[tokio::test]
async fn subtree_scan_does_not_touch_siblings() {
    let lib = test_library().await;
    let a = lib.root.join("A/a.cbz");
    let b = lib.root.join("B/b.cbz");
    write_comic(&a, 1, None);
    write_comic(&b, 1, None);

    let summary = lib
        .scanner
        .scan(Some(&lib.root.join("A")), false)
        .await
        .unwrap();
    assert_eq!(summary.added, 1);
    assert!(lib.repo.comic_by_path(&b).await.unwrap().is_none());

    lib.scanner.scan(None, false).await.unwrap();
    fs::remove_file(&b).unwrap();

    // Deleting B's file and rescanning only A must not reconcile B.
    let summary = lib
        .scanner
        .scan(Some(&lib.root.join("A")), false)
        .await
        .unwrap();
    assert_eq!(summary.deleted, 0);
    assert!(lib.repo.comic_by_path(&b).await.unwrap().is_some());
}

#[tokio::test]
async fn series_comes_from_leaf_folders_only() {
    let lib = test_library().await;
    // Marvel has a subfolder, so it is not a leaf; X-Men is.
    let omnibus = lib.root.join("Marvel/omnibus.cbz");
    let issue = lib.root.join("Marvel/X-Men/001.cbz");
    write_comic(&issue, 1, None);
    write_comic(&omnibus, 1, None);

    lib.scanner.scan(None, false).await.unwrap();

    let omnibus = lib.repo.comic_by_path(&omnibus).await.unwrap().unwrap();
    let omnibus_meta = lib
        .repo
        .metadata_by_comic(omnibus.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(omnibus_meta.series, None);

    let issue = lib.repo.comic_by_path(&issue).await.unwrap().unwrap();
    let issue_meta =
        lib.repo.metadata_by_comic(issue.id).await.unwrap().unwrap();
    assert_eq!(issue_meta.series.as_deref(), Some("X-Men"));
}

#[tokio::test]
async fn metadata_merge_never_clears_fields() {
    let lib = test_library().await;
    let path = lib.root.join("Series/a.cbz");
    write_comic(
        &path,
        1,
        Some("<ComicInfo><Title>First</Title><Writer>Moore</Writer></ComicInfo>"),
    );
    lib.scanner.scan(None, false).await.unwrap();

    // New extraction supplies only a summary; title and writer survive.
    write_comic(
        &path,
        1,
        Some("<ComicInfo><Summary>Second pass</Summary></ComicInfo>"),
    );
    bump_mtime(&path, Duration::from_secs(10));
    lib.scanner.scan(None, false).await.unwrap();

    let comic = lib.repo.comic_by_path(&path).await.unwrap().unwrap();
    let metadata = lib
        .repo
        .metadata_by_comic(comic.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(metadata.title.as_deref(), Some("First"));
    assert_eq!(metadata.writer.as_deref(), Some("Moore"));
    assert_eq!(metadata.summary.as_deref(), Some("Second pass"));
}

#[tokio::test]
async fn ignored_names_are_skipped() {
    let lib = test_library().await;
    write_comic(&lib.root.join("Series/a.cbz"), 1, None);
    write_comic(&lib.root.join("Series/._a.cbz"), 1, None);
    write_comic(&lib.root.join("@eaDir/cache.cbz"), 1, None);

    let summary = lib.scanner.scan(None, false).await.unwrap();
    assert_eq!(summary.added, 1);
    assert!(
        lib.repo
            .folder_by_path(&lib.root.join("@eaDir"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn scan_file_and_delete_path_primitives() {
    let lib = test_library().await;
    let path = lib.root.join("Series/a.cbz");
    write_comic(&path, 2, None);

    lib.scanner.scan_file(&path).await.unwrap();
    let comic = lib.repo.comic_by_path(&path).await.unwrap().unwrap();
    assert_eq!(comic.page_count, 2);

    fs::remove_file(&path).unwrap();
    lib.scanner.delete_path(&path).await.unwrap();
    assert!(lib.repo.comic_by_path(&path).await.unwrap().is_none());
}

#[tokio::test]
async fn scan_folder_primitive_indexes_new_directory() {
    let lib = test_library().await;
    write_comic(&lib.root.join("Incoming/x.cbz"), 1, None);
    write_comic(&lib.root.join("Incoming/Nested/y.cbz"), 1, None);

    lib.scanner
        .scan_folder(&lib.root.join("Incoming"))
        .await
        .unwrap();

    assert!(
        lib.repo
            .comic_by_path(&lib.root.join("Incoming/x.cbz"))
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        lib.repo
            .comic_by_path(&lib.root.join("Incoming/Nested/y.cbz"))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn delete_path_on_folder_cleans_subtree() {
    let lib = test_library().await;
    write_comic(&lib.root.join("Gone/a.cbz"), 1, None);
    write_comic(&lib.root.join("Gone/Deep/b.cbz"), 1, None);
    lib.scanner.scan(None, false).await.unwrap();

    let a = lib
        .repo
        .comic_by_path(&lib.root.join("Gone/a.cbz"))
        .await
        .unwrap()
        .unwrap();
    let thumb = lib.thumbnails.thumbnail_path(a.uuid);

    fs::remove_dir_all(lib.root.join("Gone")).unwrap();
    lib.scanner
        .delete_path(&lib.root.join("Gone"))
        .await
        .unwrap();

    assert!(
        lib.repo
            .comic_by_path(&lib.root.join("Gone/a.cbz"))
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        lib.repo
            .folder_by_path(&lib.root.join("Gone"))
            .await
            .unwrap()
            .is_none()
    );
    assert!(!thumb.exists());
}

#[tokio::test]
async fn missing_scan_base_is_an_error() {
    let lib = test_library().await;
    let missing = lib.root.join("nope");
    assert!(lib.scanner.scan(Some(&missing), false).await.is_err());
}
