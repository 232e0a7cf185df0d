// tests/test_object_fs.rs
//
// End-to-end coverage of the object-store facade over the in-memory backend:
// pagination, hierarchy emulation, bulk batching, multipart uploads and the
// copy size threshold.

use anyhow::Result;
use std::io::Write;

use omnifs::filesystem::{Filesystem, UploadSource};
use omnifs::memory::MemoryClient;
use omnifs::object_client::ProviderProfile;
use omnifs::object_fs::ObjectFilesystem;
use omnifs::paging::list_all;
use omnifs::StorageError;

const BUCKET: &str = "bkt";

fn profile() -> ProviderProfile {
    ProviderProfile::new("memory").with_default_container(Some(BUCKET.to_string()))
}

fn fs_with(profile: ProviderProfile) -> ObjectFilesystem<MemoryClient> {
    ObjectFilesystem::new(MemoryClient::with_profile(profile))
}

#[tokio::test]
async fn upload_download_roundtrip() -> Result<()> {
    let fs = fs_with(profile());
    fs.upload_file("docs/readme.txt", UploadSource::Bytes(b"hello omnifs"), None)
        .await?;
    let data = fs.download_file("docs/readme.txt", None, None).await?;
    assert_eq!(data.as_deref(), Some(&b"hello omnifs"[..]));

    let meta = fs.file_meta("docs/readme.txt", None).await?;
    assert_eq!(meta.size, 12);
    assert!(fs.file_exists("docs/readme.txt", None).await?);
    assert!(!fs.file_exists("docs/other.txt", None).await?);
    Ok(())
}

#[tokio::test]
async fn download_missing_is_not_found() {
    let fs = fs_with(profile());
    let err = fs.download_file("absent.bin", None, None).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
async fn missing_container_is_a_configuration_error() {
    let fs = fs_with(ProviderProfile::new("memory"));
    let err = fs.file_exists("x", None).await.unwrap_err();
    assert!(matches!(err, StorageError::Configuration(_)));
}

#[tokio::test]
async fn mkdir_is_a_no_op() -> Result<()> {
    let fs = fs_with(profile());
    fs.mkdir("some/dir", None).await?;
    assert!(fs.client().keys(BUCKET).is_empty());
    Ok(())
}

#[tokio::test]
async fn listing_follows_pagination_to_the_end() -> Result<()> {
    let mut p = profile();
    p.list_page_size = 3;
    let client = MemoryClient::with_profile(p);
    for i in 0..10 {
        client.seed(BUCKET, &format!("docs/file-{i:02}.txt"), b"x");
    }
    client.seed(BUCKET, "docs/sub/inner.txt", b"x");

    let listing = list_all(&client, BUCKET, None, "docs/").await?;
    assert_eq!(listing.keys.len(), 10);
    assert_eq!(listing.common_prefixes, vec!["docs/sub/".to_string()]);
    // 11 raw entries at 3 per page means several round trips.
    assert!(client.counters().list_pages >= 4);
    Ok(())
}

#[tokio::test]
async fn root_listing_discovers_common_prefixes() -> Result<()> {
    let client = MemoryClient::with_profile(profile());
    client.seed(BUCKET, "a/x", b"1");
    client.seed(BUCKET, "a/y", b"2");
    client.seed(BUCKET, "b/z", b"3");

    let listing = list_all(&client, BUCKET, None, "").await?;
    assert!(listing.keys.is_empty());
    assert_eq!(
        listing.common_prefixes,
        vec!["a/".to_string(), "b/".to_string()]
    );
    // Fits in one page, so exactly one round trip.
    assert_eq!(client.counters().list_pages, 1);
    Ok(())
}

#[tokio::test]
async fn list_files_returns_one_page_with_cursor() -> Result<()> {
    let mut p = profile();
    p.list_page_size = 2;
    let fs = fs_with(p);
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs.client().seed(BUCKET, &format!("dir/{name}"), b"x");
    }

    let first = fs.list_files("dir/", None, 2, None).await?;
    assert_eq!(first.keys, vec!["dir/a.txt", "dir/b.txt"]);
    assert!(first.truncated);
    let cursor = first.next_cursor.expect("truncated page must carry a cursor");

    let second = fs.list_files("dir/", Some(&cursor), 2, None).await?;
    assert_eq!(second.keys, vec!["dir/c.txt"]);
    assert!(!second.truncated);
    assert!(second.next_cursor.is_none());
    Ok(())
}

#[tokio::test]
async fn remove_single_object() -> Result<()> {
    let fs = fs_with(profile());
    fs.client().seed(BUCKET, "a.txt", b"x");
    fs.remove(&["a.txt"], None).await?;
    assert!(fs.client().keys(BUCKET).is_empty());
    Ok(())
}

#[tokio::test]
async fn remove_expands_virtual_subtrees_and_is_idempotent() -> Result<()> {
    let mut p = profile();
    p.delete_batch_limit = 2;
    let fs = fs_with(p);
    for key in [
        "docs/a.txt",
        "docs/b.txt",
        "docs/sub/c.txt",
        "docs/sub/deep/d.txt",
        "keep/e.txt",
    ] {
        fs.client().seed(BUCKET, key, b"x");
    }

    fs.remove(&["docs"], None).await?;
    assert_eq!(fs.client().keys(BUCKET), vec!["keep/e.txt".to_string()]);
    // 4 keys at a 2-key batch limit.
    assert!(fs.client().counters().delete_batches >= 2);

    // Absent now, so removing again is a no-op.
    fs.remove(&["docs"], None).await?;
    assert_eq!(fs.client().keys(BUCKET), vec!["keep/e.txt".to_string()]);
    Ok(())
}

#[tokio::test]
async fn remove_sees_prefixes_that_surface_on_later_pages() -> Result<()> {
    let mut p = profile();
    p.list_page_size = 2;
    let fs = fs_with(p);
    // At a 2-key page size the leaves of "d/" span multiple pages; every
    // subdirectory must still be discovered and removed.
    for key in ["d/a/1", "d/m", "d/n", "d/z/9"] {
        fs.client().seed(BUCKET, key, b"x");
    }

    fs.remove(&["d"], None).await?;
    assert_eq!(
        fs.client().keys(BUCKET),
        Vec::<String>::new(),
        "keys left behind after remove"
    );
    Ok(())
}

#[tokio::test]
async fn rename_carries_every_subtree_across_pages() -> Result<()> {
    let mut p = profile();
    p.list_page_size = 2;
    let fs = fs_with(p);
    for key in ["d/a/1", "d/m", "d/n", "d/z/9"] {
        fs.client().seed(BUCKET, key, b"x");
    }

    fs.rename(&["d"], "moved", None).await?;
    assert_eq!(
        fs.client().keys(BUCKET),
        vec![
            "moved/a/1".to_string(),
            "moved/m".to_string(),
            "moved/n".to_string(),
            "moved/z/9".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn rename_rewrites_member_keys_under_the_target() -> Result<()> {
    let fs = fs_with(profile());
    for key in ["old/a.txt", "old/sub/b.txt", "other/c.txt"] {
        fs.client().seed(BUCKET, key, b"x");
    }

    fs.rename(&["old"], "new", None).await?;
    assert_eq!(
        fs.client().keys(BUCKET),
        vec![
            "new/a.txt".to_string(),
            "new/sub/b.txt".to_string(),
            "other/c.txt".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn rename_single_object_lands_under_the_target() -> Result<()> {
    let fs = fs_with(profile());
    fs.client().seed(BUCKET, "dir/c.txt", b"x");
    fs.rename(&["dir/c.txt"], "moved", None).await?;
    assert_eq!(fs.client().keys(BUCKET), vec!["moved/c.txt".to_string()]);
    Ok(())
}

#[tokio::test]
async fn rename_to_dot_targets_the_container_root() -> Result<()> {
    let fs = fs_with(profile());
    fs.client().seed(BUCKET, "old/a.txt", b"x");
    fs.client().seed(BUCKET, "old/sub/b.txt", b"x");
    fs.rename(&["old"], ".", None).await?;
    assert_eq!(
        fs.client().keys(BUCKET),
        vec!["a.txt".to_string(), "sub/b.txt".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn move_path_copies_then_removes_the_source() -> Result<()> {
    let fs = fs_with(profile());
    fs.client().seed(BUCKET, "src.bin", b"payload");
    fs.move_path("src.bin", "dst.bin", None, None).await?;
    assert_eq!(fs.client().keys(BUCKET), vec!["dst.bin".to_string()]);
    assert_eq!(fs.client().contents(BUCKET, "dst.bin").unwrap(), b"payload");
    Ok(())
}

#[tokio::test]
async fn copy_below_threshold_is_one_whole_copy() -> Result<()> {
    let fs = fs_with(profile());
    fs.client().seed(BUCKET, "small.bin", b"tiny");
    fs.copy_file("small.bin", "copy.bin", None, None).await?;
    let counters = fs.client().counters();
    assert_eq!(counters.whole_copies, 1);
    assert_eq!(counters.range_copies, 0);
    assert_eq!(fs.client().contents(BUCKET, "copy.bin").unwrap(), b"tiny");
    Ok(())
}

#[tokio::test]
async fn copy_above_threshold_switches_to_ranged_parts() -> Result<()> {
    let mut p = profile();
    p.multipart_copy_threshold = 10;
    p.copy_part_size = 4;
    let fs = fs_with(p);
    let payload = b"0123456789A"; // 11 bytes, 3 chunks of <= 4
    fs.client().seed(BUCKET, "big.bin", payload);

    fs.copy_file("big.bin", "big-copy.bin", None, None).await?;
    let counters = fs.client().counters();
    assert_eq!(counters.whole_copies, 0);
    assert_eq!(counters.range_copies, 3);
    assert_eq!(counters.sessions_completed, 1);
    assert_eq!(fs.client().contents(BUCKET, "big-copy.bin").unwrap(), payload);
    // The source survives the copy.
    assert_eq!(fs.client().contents(BUCKET, "big.bin").unwrap(), payload);
    Ok(())
}

#[tokio::test]
async fn zero_size_multipart_copy_needs_no_session() -> Result<()> {
    let client = MemoryClient::with_profile(profile());
    client.seed(BUCKET, "empty.bin", b"");

    omnifs::multipart::copy_multipart(&client, BUCKET, "empty.bin", BUCKET, "empty-copy.bin", 0)
        .await?;
    assert_eq!(client.contents(BUCKET, "empty-copy.bin").unwrap(), b"");
    let counters = client.counters();
    assert_eq!(counters.sessions_created, 0);
    assert_eq!(counters.range_copies, 0);
    Ok(())
}

#[tokio::test]
async fn multipart_upload_from_file_splits_and_reassembles() -> Result<()> {
    let mut p = profile();
    p.part_size = 1000;
    let fs = fs_with(p);

    let mut source = tempfile::NamedTempFile::new()?;
    let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
    source.write_all(&payload)?;
    source.flush()?;

    fs.multipart_upload_from_file("data/blob.bin", source.path(), None)
        .await?;
    let counters = fs.client().counters();
    assert_eq!(counters.sessions_created, 1);
    assert_eq!(counters.part_uploads, 3);
    assert_eq!(counters.sessions_completed, 1);
    assert_eq!(fs.client().contents(BUCKET, "data/blob.bin").unwrap(), payload);
    Ok(())
}

#[tokio::test]
async fn large_upload_source_routes_through_multipart() -> Result<()> {
    let mut p = profile();
    p.part_size = 100;
    let fs = fs_with(p);

    let mut source = tempfile::NamedTempFile::new()?;
    source.write_all(&[7u8; 350])?;
    source.flush()?;

    fs.upload_file("blob.bin", UploadSource::LocalFile(source.path()), None)
        .await?;
    let counters = fs.client().counters();
    assert_eq!(counters.puts, 0);
    assert_eq!(counters.part_uploads, 4);
    assert_eq!(fs.client().contents(BUCKET, "blob.bin").unwrap(), vec![7u8; 350]);
    Ok(())
}

#[tokio::test]
async fn manual_multipart_session_merges_in_part_order() -> Result<()> {
    let fs = fs_with(profile());
    let id = fs.initiate_multipart_upload("staged.bin", None).await?;

    // Parts arrive out of order; the merge sorts them.
    let p2 = fs.upload_part("staged.bin", b"world", 2, Some(&id), None).await?;
    let p1 = fs.upload_part("staged.bin", b"hello ", 1, Some(&id), None).await?;
    fs.merge_multipart_upload("staged.bin", &[p2, p1], Some(&id), None)
        .await?;
    assert_eq!(
        fs.client().contents(BUCKET, "staged.bin").unwrap(),
        b"hello world"
    );
    Ok(())
}

#[tokio::test]
async fn upload_part_without_session_id_is_rejected() {
    let fs = fs_with(profile());
    let err = fs
        .upload_part("x.bin", b"data", 1, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Configuration(_)));
}

#[tokio::test]
async fn corrupted_part_etag_is_retried_once() -> Result<()> {
    let fs = fs_with(profile());
    fs.client().corrupt_part_etag(1, 1);

    let id = fs.initiate_multipart_upload("r.bin", None).await?;
    let desc = fs.upload_part("r.bin", b"data", 1, Some(&id), None).await?;
    assert_eq!(desc.part_number, 1);
    // First attempt mismatched, the retry went through.
    assert_eq!(fs.client().counters().part_uploads, 2);
    Ok(())
}

#[tokio::test]
async fn persistent_etag_mismatch_fails_after_one_retry() -> Result<()> {
    let fs = fs_with(profile());
    fs.client().corrupt_part_etag(1, 2);

    let id = fs.initiate_multipart_upload("r.bin", None).await?;
    let err = fs
        .upload_part("r.bin", b"data", 1, Some(&id), None)
        .await
        .unwrap_err();
    match err {
        StorageError::IntegrityMismatch { part_number, .. } => assert_eq!(part_number, 1),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fs.client().counters().part_uploads, 2);
    Ok(())
}

#[tokio::test]
async fn download_to_local_path_writes_the_file() -> Result<()> {
    let fs = fs_with(profile());
    fs.client().seed(BUCKET, "remote.txt", b"on disk");

    let dir = tempfile::TempDir::new()?;
    let dest = dir.path().join("nested").join("remote.txt");
    let returned = fs.download_file("remote.txt", Some(&dest), None).await?;
    assert!(returned.is_none());
    assert_eq!(std::fs::read(&dest)?, b"on disk");
    Ok(())
}

#[tokio::test]
async fn explicit_container_overrides_the_default() -> Result<()> {
    let fs = fs_with(profile());
    fs.upload_file("k.txt", UploadSource::Bytes(b"x"), Some("other"))
        .await?;
    assert!(fs.client().keys(BUCKET).is_empty());
    assert_eq!(fs.client().keys("other"), vec!["k.txt".to_string()]);
    Ok(())
}
