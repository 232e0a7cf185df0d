// src/object_client.rs
//
// The primitive contract flat object backends expose. The shared algorithms
// (paging, tree ops, batching, multipart) are written once against this trait
// and never against a concrete SDK.

use async_trait::async_trait;

use crate::constants::{
    COPY_PART_SIZE, DEFAULT_LIST_PAGE_SIZE, DEFAULT_PART_SIZE, DELETE_BATCH_LIMIT,
    MULTIPART_COPY_THRESHOLD, RENAME_BATCH_LIMIT,
};
use crate::error::{Result, StorageError};
use crate::filesystem::{ListingPage, ObjectMetadata, PartDescriptor};
use crate::multipart::PartRange;

/// Per-provider limits and defaults. Providers share one wire client but
/// differ in page sizes, batch caps and whether part ETags are MD5s.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub name: &'static str,
    pub default_container: Option<String>,
    pub list_page_size: i32,
    pub delete_batch_limit: usize,
    pub rename_batch_limit: usize,
    /// Whether the backend reports a part's hex MD5 as its ETag, enabling the
    /// per-part integrity check.
    pub verify_part_md5: bool,
    pub part_size: u64,
    pub copy_part_size: u64,
    pub multipart_copy_threshold: u64,
}

impl ProviderProfile {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            default_container: None,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            delete_batch_limit: DELETE_BATCH_LIMIT,
            rename_batch_limit: RENAME_BATCH_LIMIT,
            verify_part_md5: true,
            part_size: DEFAULT_PART_SIZE,
            copy_part_size: COPY_PART_SIZE,
            multipart_copy_threshold: MULTIPART_COPY_THRESHOLD,
        }
    }

    pub fn with_default_container(mut self, container: Option<String>) -> Self {
        self.default_container = container;
        self
    }

    pub fn with_list_page_size(mut self, page_size: i32) -> Self {
        self.list_page_size = page_size;
        self
    }

    /// Resolve the container for one operation: the explicit argument wins,
    /// then the configured default.
    pub fn resolve_container<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str> {
        requested
            .or(self.default_container.as_deref())
            .ok_or_else(|| {
                StorageError::Configuration(format!(
                    "{}: no container given and no default configured",
                    self.name
                ))
            })
    }
}

/// Raw operations one flat-keyed backend exposes. Everything is scoped to an
/// explicit container; hierarchy is emulated above this trait, never below it.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    fn profile(&self) -> &ProviderProfile;

    /// Cheap existence probe for a single key.
    async fn exists(&self, container: &str, key: &str) -> Result<bool>;

    async fn head(&self, container: &str, key: &str) -> Result<ObjectMetadata>;

    async fn put(&self, container: &str, key: &str, data: &[u8]) -> Result<()>;

    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>>;

    /// Delete one key. Deleting an absent key succeeds.
    async fn delete(&self, container: &str, key: &str) -> Result<()>;

    /// One bulk-delete call. Callers are responsible for honoring
    /// `profile().delete_batch_limit`.
    async fn delete_batch(&self, container: &str, keys: &[String]) -> Result<()>;

    /// Server-side whole-object copy.
    async fn copy(
        &self,
        from_container: &str,
        from_key: &str,
        to_container: &str,
        to_key: &str,
    ) -> Result<()>;

    /// Open a multipart session and return its backend-issued id.
    async fn create_session(&self, container: &str, key: &str) -> Result<String>;

    async fn upload_part(
        &self,
        container: &str,
        key: &str,
        session: &str,
        part_number: i32,
        data: &[u8],
    ) -> Result<PartDescriptor>;

    /// Copy one byte range of a remote object into a session part.
    async fn copy_part_range(
        &self,
        from_container: &str,
        from_key: &str,
        to_container: &str,
        to_key: &str,
        session: &str,
        part: &PartRange,
    ) -> Result<PartDescriptor>;

    /// Atomically materialize the target from the ordered part list and
    /// invalidate the session.
    async fn complete_session(
        &self,
        container: &str,
        key: &str,
        session: &str,
        parts: &[PartDescriptor],
    ) -> Result<()>;

    /// One delimiter-scoped listing page.
    async fn list_page(
        &self,
        container: &str,
        prefix: &str,
        cursor: Option<&str>,
        page_size: i32,
    ) -> Result<ListingPage>;
}
