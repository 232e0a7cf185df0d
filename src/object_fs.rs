// src/object_fs.rs
//
// The generic filesystem facade over any flat object backend. All hierarchy
// emulation, batching and multipart logic lives in the shared modules; this
// type only resolves containers and routes each operation.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::filesystem::{Filesystem, ListingPage, ObjectMetadata, PartDescriptor, UploadSource};
use crate::multipart;
use crate::object_client::ObjectClient;
use crate::tree_ops;

/// Filesystem adapter composing a concrete `ObjectClient` with the shared
/// algorithms. One type serves every S3-dialect provider; behavior differences
/// come from the client's `ProviderProfile`.
pub struct ObjectFilesystem<C: ObjectClient> {
    client: C,
}

impl<C: ObjectClient> ObjectFilesystem<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn container<'a>(&'a self, requested: Option<&'a str>) -> Result<&'a str> {
        self.client.profile().resolve_container(requested)
    }
}

#[async_trait]
impl<C: ObjectClient> Filesystem for ObjectFilesystem<C> {
    /// Directories are key prefixes here; there is nothing to create.
    async fn mkdir(&self, path: &str, container: Option<&str>) -> Result<()> {
        let _ = self.container(container)?;
        debug!(path, "mkdir is a no-op on object storage");
        Ok(())
    }

    async fn remove(&self, paths: &[&str], container: Option<&str>) -> Result<()> {
        let container = self.container(container)?;
        tree_ops::remove_paths(&self.client, container, paths).await
    }

    async fn rename(
        &self,
        old_names: &[&str],
        new_name: &str,
        container: Option<&str>,
    ) -> Result<()> {
        let container = self.container(container)?;
        tree_ops::rename_paths(&self.client, container, old_names, new_name).await
    }

    async fn upload_file(
        &self,
        path: &str,
        source: UploadSource<'_>,
        container: Option<&str>,
    ) -> Result<()> {
        let container = self.container(container)?;
        match source {
            UploadSource::Bytes(data) => self.client.put(container, path, data).await,
            UploadSource::LocalFile(file) => {
                let size = tokio::fs::metadata(file)
                    .await
                    .map_err(|e| {
                        StorageError::Configuration(format!(
                            "cannot stat upload source {}: {e}",
                            file.display()
                        ))
                    })?
                    .len();
                let part_size = self.client.profile().part_size;
                if size > part_size {
                    multipart::upload_file_multipart(&self.client, container, path, file, part_size)
                        .await
                } else {
                    let data = tokio::fs::read(file)
                        .await
                        .map_err(|e| StorageError::Backend(e.into()))?;
                    self.client.put(container, path, &data).await
                }
            }
        }
    }

    async fn initiate_multipart_upload(
        &self,
        path: &str,
        container: Option<&str>,
    ) -> Result<String> {
        let container = self.container(container)?;
        self.client.create_session(container, path).await
    }

    async fn upload_part(
        &self,
        path: &str,
        data: &[u8],
        part_number: i32,
        upload_id: Option<&str>,
        container: Option<&str>,
    ) -> Result<PartDescriptor> {
        let container = self.container(container)?;
        let session = upload_id.ok_or_else(|| {
            StorageError::Configuration("upload_part on object storage requires an upload id".into())
        })?;
        multipart::upload_part_verified(&self.client, container, path, session, part_number, data)
            .await
    }

    async fn merge_multipart_upload(
        &self,
        path: &str,
        parts: &[PartDescriptor],
        upload_id: Option<&str>,
        container: Option<&str>,
    ) -> Result<()> {
        let container = self.container(container)?;
        let session = upload_id.ok_or_else(|| {
            StorageError::Configuration(
                "merge_multipart_upload on object storage requires an upload id".into(),
            )
        })?;
        let mut parts = parts.to_vec();
        parts.sort_by_key(|p| p.part_number);
        self.client
            .complete_session(container, path, session, &parts)
            .await
    }

    async fn multipart_upload_from_file(
        &self,
        path: &str,
        file: &Path,
        container: Option<&str>,
    ) -> Result<()> {
        let container = self.container(container)?;
        let part_size = self.client.profile().part_size;
        multipart::upload_file_multipart(&self.client, container, path, file, part_size).await
    }

    async fn download_file(
        &self,
        path: &str,
        local: Option<&Path>,
        container: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        let container = self.container(container)?;
        let data = self.client.get(container, path).await?;
        match local {
            Some(dest) => {
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| StorageError::Backend(e.into()))?;
                }
                tokio::fs::write(dest, &data)
                    .await
                    .map_err(|e| StorageError::Backend(e.into()))?;
                Ok(None)
            }
            None => Ok(Some(data)),
        }
    }

    async fn copy_file(
        &self,
        from: &str,
        to: &str,
        from_container: Option<&str>,
        to_container: Option<&str>,
    ) -> Result<()> {
        let from_container = self.container(from_container)?;
        let to_container = to_container.unwrap_or(from_container);
        tree_ops::copy_object(&self.client, from_container, from, to_container, to).await
    }

    async fn file_exists(&self, path: &str, container: Option<&str>) -> Result<bool> {
        let container = self.container(container)?;
        self.client.exists(container, path).await
    }

    async fn file_meta(&self, path: &str, container: Option<&str>) -> Result<ObjectMetadata> {
        let container = self.container(container)?;
        self.client.head(container, path).await
    }

    async fn list_files(
        &self,
        prefix: &str,
        start: Option<&str>,
        page_size: i32,
        container: Option<&str>,
    ) -> Result<ListingPage> {
        let container = self.container(container)?;
        self.client
            .list_page(container, prefix, start, page_size)
            .await
    }
}
