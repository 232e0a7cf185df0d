// src/filesystem.rs
//
// The single polymorphic contract every backend implements, plus the shared
// data model. Calling code depends on `dyn Filesystem` and nothing else.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, StorageError};

/// Provider-neutral object metadata (HEAD-like).
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub e_tag: Option<String>,
}

/// One page of a delimiter listing. Keys and common prefixes are partitioned
/// by the `/` delimiter: keys are leaves at the queried depth, common
/// prefixes are the virtual subdirectories one level below it.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub keys: Vec<String>,
    pub common_prefixes: Vec<String>,
    pub truncated: bool,
    /// Opaque cursor for the next page; meaningful only while `truncated`.
    pub next_cursor: Option<String>,
}

/// The (part number, integrity tag) pair identifying one completed part.
/// Part numbers are 1-based and must be contiguous at completion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescriptor {
    pub part_number: i32,
    pub e_tag: String,
}

/// Content for `upload_file`: inline bytes or a local file to stream.
#[derive(Debug, Clone, Copy)]
pub enum UploadSource<'a> {
    Bytes(&'a [u8]),
    LocalFile(&'a Path),
}

impl<'a> UploadSource<'a> {
    /// Original dispatch rule: a string that names an existing local file is
    /// uploaded as that file, anything else is treated as inline content.
    pub fn detect(content: &'a str) -> UploadSource<'a> {
        let candidate = Path::new(content);
        if candidate.is_file() {
            UploadSource::LocalFile(candidate)
        } else {
            UploadSource::Bytes(content.as_bytes())
        }
    }
}

/// Uniform filesystem contract over flat object stores, FTP and local disk.
///
/// Paths are forward-slash delimited. `container` selects the storage scope
/// (bucket); `None` means the backend's configured default or its only root.
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Create a directory. A deliberate no-op on pure object stores, where
    /// directories exist only as key prefixes.
    async fn mkdir(&self, path: &str, container: Option<&str>) -> Result<()>;

    /// Remove each path, whether it names a single object or a whole virtual
    /// subtree. Removing something absent is a no-op, so the call is
    /// idempotent.
    async fn remove(&self, paths: &[&str], container: Option<&str>) -> Result<()>;

    /// Move = copy then remove. Works across containers; not atomic, a crash
    /// between the two steps leaves both copies present.
    async fn move_path(
        &self,
        from: &str,
        to: &str,
        from_container: Option<&str>,
        to_container: Option<&str>,
    ) -> Result<()> {
        self.copy_file(from, to, from_container, to_container).await?;
        self.remove(&[from], from_container).await
    }

    /// Rename each old name to `new_name`. A name that resolves to a single
    /// object is moved directly; otherwise it is expanded as a prefix and
    /// every member key is rewritten under `new_name`.
    async fn rename(&self, old_names: &[&str], new_name: &str, container: Option<&str>)
        -> Result<()>;

    /// Upload inline bytes or a local file to `path`.
    async fn upload_file(
        &self,
        path: &str,
        source: UploadSource<'_>,
        container: Option<&str>,
    ) -> Result<()>;

    /// Open a multipart session for `path` and return its id. Backends with
    /// no native multipart API synthesize a deterministic id from the path.
    async fn initiate_multipart_upload(&self, path: &str, container: Option<&str>)
        -> Result<String>;

    /// Upload one part. `upload_id` is required for object stores and ignored
    /// by backends whose session id is derived from the path.
    async fn upload_part(
        &self,
        path: &str,
        data: &[u8],
        part_number: i32,
        upload_id: Option<&str>,
        container: Option<&str>,
    ) -> Result<PartDescriptor>;

    /// Finalize a multipart session. Parts are sorted by part number here, so
    /// callers may pass them in any order.
    async fn merge_multipart_upload(
        &self,
        path: &str,
        parts: &[PartDescriptor],
        upload_id: Option<&str>,
        container: Option<&str>,
    ) -> Result<()>;

    /// Full initiate → planned parts → complete cycle for one local file.
    async fn multipart_upload_from_file(
        &self,
        path: &str,
        file: &Path,
        container: Option<&str>,
    ) -> Result<()>;

    /// Download `path`. With a local destination the bytes are written there
    /// and `None` is returned; without one the bytes come back directly.
    async fn download_file(
        &self,
        path: &str,
        local: Option<&Path>,
        container: Option<&str>,
    ) -> Result<Option<Vec<u8>>>;

    /// Copy one object. Transparently switches to a ranged multipart copy
    /// above the backend's size threshold.
    async fn copy_file(
        &self,
        from: &str,
        to: &str,
        from_container: Option<&str>,
        to_container: Option<&str>,
    ) -> Result<()>;

    async fn file_exists(&self, path: &str, container: Option<&str>) -> Result<bool> {
        match self.file_meta(path, container).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn file_meta(&self, path: &str, container: Option<&str>) -> Result<ObjectMetadata>;

    /// One non-recursive delimiter listing page. Recursion over common
    /// prefixes is the caller's responsibility.
    async fn list_files(
        &self,
        prefix: &str,
        start: Option<&str>,
        page_size: i32,
        container: Option<&str>,
    ) -> Result<ListingPage>;
}
