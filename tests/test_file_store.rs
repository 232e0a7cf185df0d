// tests/test_file_store.rs
//
// Local-disk backend coverage: real directories, staged multipart merge and
// the entry-name pagination of list_files.

use anyhow::Result;
use tempfile::TempDir;

use omnifs::file_store::LocalFilesystem;
use omnifs::filesystem::{Filesystem, UploadSource};
use omnifs::StorageError;

fn local() -> Result<(TempDir, LocalFilesystem)> {
    let dir = TempDir::new()?;
    let fs = LocalFilesystem::new(dir.path());
    Ok((dir, fs))
}

#[tokio::test]
async fn upload_and_download_roundtrip() -> Result<()> {
    let (_dir, fs) = local()?;
    fs.upload_file("docs/readme.txt", UploadSource::Bytes(b"hello"), None)
        .await?;
    let data = fs.download_file("docs/readme.txt", None, None).await?;
    assert_eq!(data.as_deref(), Some(&b"hello"[..]));

    let meta = fs.file_meta("docs/readme.txt", None).await?;
    assert_eq!(meta.size, 5);
    assert!(meta.last_modified.is_some());
    assert!(fs.file_exists("docs/readme.txt", None).await?);
    Ok(())
}

#[tokio::test]
async fn upload_source_detect_picks_files_apart_from_content() -> Result<()> {
    let mut probe = tempfile::NamedTempFile::new()?;
    std::io::Write::write_all(&mut probe, b"file body")?;
    let path_string = probe.path().to_string_lossy().into_owned();

    assert!(matches!(
        UploadSource::detect(&path_string),
        UploadSource::LocalFile(_)
    ));
    assert!(matches!(
        UploadSource::detect("inline content"),
        UploadSource::Bytes(_)
    ));

    let (_dir, fs) = local()?;
    fs.upload_file("from-file.txt", UploadSource::detect(&path_string), None)
        .await?;
    let data = fs.download_file("from-file.txt", None, None).await?;
    assert_eq!(data.as_deref(), Some(&b"file body"[..]));
    Ok(())
}

#[tokio::test]
async fn mkdir_creates_real_directories() -> Result<()> {
    let (dir, fs) = local()?;
    fs.mkdir("a/b/c", None).await?;
    assert!(dir.path().join("a/b/c").is_dir());
    Ok(())
}

#[tokio::test]
async fn remove_handles_files_directories_and_absence() -> Result<()> {
    let (dir, fs) = local()?;
    fs.upload_file("f.txt", UploadSource::Bytes(b"x"), None).await?;
    fs.upload_file("tree/a.txt", UploadSource::Bytes(b"x"), None)
        .await?;
    fs.upload_file("tree/sub/b.txt", UploadSource::Bytes(b"x"), None)
        .await?;

    fs.remove(&["f.txt", "tree", "never-existed"], None).await?;
    assert!(!dir.path().join("f.txt").exists());
    assert!(!dir.path().join("tree").exists());

    // Still idempotent on a second pass.
    fs.remove(&["tree"], None).await?;
    Ok(())
}

#[tokio::test]
async fn rename_file_lands_under_the_target() -> Result<()> {
    let (dir, fs) = local()?;
    fs.upload_file("dir/c.txt", UploadSource::Bytes(b"x"), None)
        .await?;
    fs.rename(&["dir/c.txt"], "moved", None).await?;
    assert!(dir.path().join("moved/c.txt").is_file());
    assert!(!dir.path().join("dir/c.txt").exists());
    Ok(())
}

#[tokio::test]
async fn rename_directory_moves_members_under_the_target() -> Result<()> {
    let (dir, fs) = local()?;
    fs.upload_file("old/a.txt", UploadSource::Bytes(b"x"), None)
        .await?;
    fs.upload_file("old/sub/b.txt", UploadSource::Bytes(b"x"), None)
        .await?;

    fs.rename(&["old"], "new", None).await?;
    assert!(dir.path().join("new/a.txt").is_file());
    assert!(dir.path().join("new/sub/b.txt").is_file());
    assert!(!dir.path().join("old").exists());
    Ok(())
}

#[tokio::test]
async fn copy_file_leaves_the_source_in_place() -> Result<()> {
    let (dir, fs) = local()?;
    fs.upload_file("src.bin", UploadSource::Bytes(b"payload"), None)
        .await?;
    fs.copy_file("src.bin", "nested/dst.bin", None, None).await?;
    assert_eq!(std::fs::read(dir.path().join("src.bin"))?, b"payload");
    assert_eq!(std::fs::read(dir.path().join("nested/dst.bin"))?, b"payload");
    Ok(())
}

#[tokio::test]
async fn move_path_removes_the_source() -> Result<()> {
    let (dir, fs) = local()?;
    fs.upload_file("src.bin", UploadSource::Bytes(b"payload"), None)
        .await?;
    fs.move_path("src.bin", "dst.bin", None, None).await?;
    assert!(!dir.path().join("src.bin").exists());
    assert_eq!(std::fs::read(dir.path().join("dst.bin"))?, b"payload");
    Ok(())
}

#[tokio::test]
async fn staged_multipart_merges_in_part_order() -> Result<()> {
    let (dir, fs) = local()?;
    let id = fs.initiate_multipart_upload("big/blob.bin", None).await?;
    // The id is derived from the path, so it is stable.
    assert_eq!(id, fs.initiate_multipart_upload("big/blob.bin", None).await?);

    let p3 = fs.upload_part("big/blob.bin", b"!", 3, Some(&id), None).await?;
    let p1 = fs
        .upload_part("big/blob.bin", b"hello ", 1, Some(&id), None)
        .await?;
    let p2 = fs
        .upload_part("big/blob.bin", b"world", 2, Some(&id), None)
        .await?;
    fs.merge_multipart_upload("big/blob.bin", &[p3, p1, p2], Some(&id), None)
        .await?;

    assert_eq!(std::fs::read(dir.path().join("big/blob.bin"))?, b"hello world!");
    // Staging files are cleaned up after the merge.
    assert!(!dir.path().join("big/blob.bin.1.part").exists());
    assert!(!dir.path().join("big/blob.bin.2.part").exists());
    assert!(!dir.path().join("big/blob.bin.3.part").exists());
    Ok(())
}

#[tokio::test]
async fn multipart_upload_from_file_is_one_copy() -> Result<()> {
    let (dir, fs) = local()?;
    let mut source = tempfile::NamedTempFile::new()?;
    std::io::Write::write_all(&mut source, b"whole body")?;
    fs.multipart_upload_from_file("dest.bin", source.path(), None)
        .await?;
    assert_eq!(std::fs::read(dir.path().join("dest.bin"))?, b"whole body");
    Ok(())
}

#[tokio::test]
async fn list_files_pages_by_entry_name() -> Result<()> {
    let (_dir, fs) = local()?;
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs.upload_file(&format!("dir/{name}"), UploadSource::Bytes(b"x"), None)
            .await?;
    }
    fs.mkdir("dir/sub", None).await?;

    let first = fs.list_files("dir/", None, 2, None).await?;
    assert_eq!(first.keys, vec!["dir/a.txt", "dir/b.txt"]);
    assert!(first.truncated);
    let cursor = first.next_cursor.expect("truncated page must carry a cursor");

    let second = fs.list_files("dir/", Some(&cursor), 10, None).await?;
    assert_eq!(second.keys, vec!["dir/c.txt"]);
    assert_eq!(second.common_prefixes, vec!["dir/sub/"]);
    assert!(!second.truncated);

    // A name filter narrows the page without a trailing slash.
    let filtered = fs.list_files("dir/b", None, 10, None).await?;
    assert_eq!(filtered.keys, vec!["dir/b.txt"]);
    Ok(())
}

#[tokio::test]
async fn listing_a_missing_directory_is_empty() -> Result<()> {
    let (_dir, fs) = local()?;
    let page = fs.list_files("nowhere/", None, 10, None).await?;
    assert!(page.keys.is_empty() && page.common_prefixes.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_file_maps_to_not_found() {
    let (_dir, fs) = local().unwrap();
    let err = fs.download_file("absent.txt", None, None).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
    assert!(!fs.file_exists("absent.txt", None).await.unwrap());
}

#[tokio::test]
async fn parent_traversal_is_rejected() {
    let (_dir, fs) = local().unwrap();
    let err = fs
        .upload_file("../escape.txt", UploadSource::Bytes(b"x"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Configuration(_)));
}
