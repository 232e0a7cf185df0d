// src/file_store.rs
//
// Local-disk backend. Directories are real here, so mkdir/remove/rename map
// straight onto std filesystem calls. Multipart uploads are emulated with
// numbered staging files merged on completion; the session id is derived from
// the path, so no server-side state exists.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::constants::STAGING_PART_EXTENSION;
use crate::error::{Result, StorageError};
use crate::filesystem::{Filesystem, ListingPage, ObjectMetadata, PartDescriptor, UploadSource};
use crate::multipart::part_integrity_tag;
use crate::path_utils::{file_name, normalize_separators, target_prefix};

/// Filesystem rooted at a local directory. The `container` argument is
/// ignored: local disk has a single root.
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a logical path onto the root, rejecting traversal out of it.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let normalized = normalize_separators(path);
        let relative = normalized.trim_start_matches('/');
        if Path::new(relative)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(StorageError::Configuration(format!(
                "path '{path}' escapes the storage root"
            )));
        }
        Ok(self.root.join(relative))
    }

    fn staging_path(&self, path: &str, part_number: i32) -> Result<PathBuf> {
        self.resolve(&format!("{path}.{part_number}.{STAGING_PART_EXTENSION}"))
    }

    async fn ensure_parent(&self, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create parent of {}", target.display()))
                .map_err(StorageError::Backend)?;
        }
        Ok(())
    }
}

fn map_io(err: std::io::Error, path: &str) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else {
        StorageError::Backend(anyhow::Error::new(err).context(format!("io on {path}")))
    }
}

#[async_trait]
impl Filesystem for LocalFilesystem {
    async fn mkdir(&self, path: &str, _container: Option<&str>) -> Result<()> {
        let target = self.resolve(path)?;
        tokio::fs::create_dir_all(&target)
            .await
            .with_context(|| format!("mkdir {}", target.display()))
            .map_err(StorageError::Backend)
    }

    async fn remove(&self, paths: &[&str], _container: Option<&str>) -> Result<()> {
        for &path in paths {
            let target = self.resolve(path)?;
            let meta = match tokio::fs::metadata(&target).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path, "nothing to remove");
                    continue;
                }
                Err(e) => return Err(map_io(e, path)),
            };
            if meta.is_dir() {
                tokio::fs::remove_dir_all(&target)
                    .await
                    .map_err(|e| map_io(e, path))?;
            } else {
                tokio::fs::remove_file(&target)
                    .await
                    .map_err(|e| map_io(e, path))?;
            }
        }
        Ok(())
    }

    async fn rename(
        &self,
        old_names: &[&str],
        new_name: &str,
        _container: Option<&str>,
    ) -> Result<()> {
        let target_dir = self.resolve(target_prefix(new_name).trim_end_matches('/'))?;
        tokio::fs::create_dir_all(&target_dir)
            .await
            .with_context(|| format!("create rename target {}", target_dir.display()))
            .map_err(StorageError::Backend)?;

        for &old in old_names {
            let source = self.resolve(old)?;
            let meta = match tokio::fs::metadata(&source).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(old, "nothing to rename");
                    continue;
                }
                Err(e) => return Err(map_io(e, old)),
            };

            if meta.is_dir() {
                // Members move under the target; the old directory goes away.
                let mut entries = tokio::fs::read_dir(&source)
                    .await
                    .map_err(|e| map_io(e, old))?;
                while let Some(entry) = entries.next_entry().await.map_err(|e| map_io(e, old))? {
                    let dest = target_dir.join(entry.file_name());
                    tokio::fs::rename(entry.path(), &dest)
                        .await
                        .with_context(|| format!("move {} into rename target", entry.path().display()))
                        .map_err(StorageError::Backend)?;
                }
                tokio::fs::remove_dir(&source)
                    .await
                    .map_err(|e| map_io(e, old))?;
            } else {
                let dest = target_dir.join(file_name(old));
                tokio::fs::rename(&source, &dest)
                    .await
                    .with_context(|| format!("rename {old}"))
                    .map_err(StorageError::Backend)?;
            }
            info!(old, new_name, "renamed");
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &str,
        source: UploadSource<'_>,
        _container: Option<&str>,
    ) -> Result<()> {
        let target = self.resolve(path)?;
        self.ensure_parent(&target).await?;
        match source {
            UploadSource::Bytes(data) => tokio::fs::write(&target, data)
                .await
                .map_err(|e| map_io(e, path)),
            UploadSource::LocalFile(file) => {
                tokio::fs::copy(file, &target)
                    .await
                    .with_context(|| format!("copy {} to {path}", file.display()))
                    .map_err(StorageError::Backend)?;
                Ok(())
            }
        }
    }

    /// No server-side session exists; the id is a digest of the path, so the
    /// same path always yields the same session.
    async fn initiate_multipart_upload(
        &self,
        path: &str,
        _container: Option<&str>,
    ) -> Result<String> {
        Ok(part_integrity_tag(path.as_bytes()))
    }

    async fn upload_part(
        &self,
        path: &str,
        data: &[u8],
        part_number: i32,
        _upload_id: Option<&str>,
        _container: Option<&str>,
    ) -> Result<PartDescriptor> {
        let staging = self.staging_path(path, part_number)?;
        self.ensure_parent(&staging).await?;
        tokio::fs::write(&staging, data)
            .await
            .map_err(|e| map_io(e, path))?;
        Ok(PartDescriptor {
            part_number,
            e_tag: part_integrity_tag(data),
        })
    }

    async fn merge_multipart_upload(
        &self,
        path: &str,
        parts: &[PartDescriptor],
        _upload_id: Option<&str>,
        _container: Option<&str>,
    ) -> Result<()> {
        let target = self.resolve(path)?;
        self.ensure_parent(&target).await?;

        let mut ordered = parts.to_vec();
        ordered.sort_by_key(|p| p.part_number);

        let mut merged = Vec::new();
        for part in &ordered {
            let staging = self.staging_path(path, part.part_number)?;
            let data = tokio::fs::read(&staging)
                .await
                .map_err(|e| map_io(e, path))?;
            merged.extend_from_slice(&data);
        }
        tokio::fs::write(&target, &merged)
            .await
            .map_err(|e| map_io(e, path))?;
        for part in &ordered {
            let staging = self.staging_path(path, part.part_number)?;
            tokio::fs::remove_file(&staging)
                .await
                .map_err(|e| map_io(e, path))?;
        }
        info!(path, parts = ordered.len(), "merged staged parts");
        Ok(())
    }

    /// Local disk needs no staging for a local source; this is one copy.
    async fn multipart_upload_from_file(
        &self,
        path: &str,
        file: &Path,
        _container: Option<&str>,
    ) -> Result<()> {
        let target = self.resolve(path)?;
        self.ensure_parent(&target).await?;
        tokio::fs::copy(file, &target)
            .await
            .with_context(|| format!("copy {} to {path}", file.display()))
            .map_err(StorageError::Backend)?;
        Ok(())
    }

    async fn download_file(
        &self,
        path: &str,
        local: Option<&Path>,
        _container: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        let source = self.resolve(path)?;
        match local {
            Some(dest) => {
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("create parent of {}", dest.display()))
                        .map_err(StorageError::Backend)?;
                }
                tokio::fs::copy(&source, dest)
                    .await
                    .map_err(|e| map_io(e, path))?;
                Ok(None)
            }
            None => {
                let data = tokio::fs::read(&source)
                    .await
                    .map_err(|e| map_io(e, path))?;
                Ok(Some(data))
            }
        }
    }

    async fn copy_file(
        &self,
        from: &str,
        to: &str,
        _from_container: Option<&str>,
        _to_container: Option<&str>,
    ) -> Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        self.ensure_parent(&target).await?;
        tokio::fs::copy(&source, &target)
            .await
            .map_err(|e| map_io(e, from))?;
        Ok(())
    }

    async fn file_meta(&self, path: &str, _container: Option<&str>) -> Result<ObjectMetadata> {
        let target = self.resolve(path)?;
        let meta = tokio::fs::metadata(&target)
            .await
            .map_err(|e| map_io(e, path))?;
        let last_modified = meta
            .modified()
            .ok()
            .map(DateTime::<Utc>::from);
        Ok(ObjectMetadata {
            size: meta.len(),
            content_type: None,
            last_modified,
            e_tag: None,
        })
    }

    /// Directory-entry listing shaped like a delimiter page: plain files are
    /// keys, subdirectories are common prefixes. The cursor is the last
    /// returned entry name.
    async fn list_files(
        &self,
        prefix: &str,
        start: Option<&str>,
        page_size: i32,
        _container: Option<&str>,
    ) -> Result<ListingPage> {
        let normalized = normalize_separators(prefix);
        let (dir_part, name_filter) = match normalized.rsplit_once('/') {
            Some((dir, name)) => (dir.to_string(), name.to_string()),
            None => (String::new(), normalized.clone()),
        };
        let dir = self.resolve(&dir_part)?;
        let dir_prefix = target_prefix(&dir_part);

        let mut entries = Vec::new();
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ListingPage::default()),
            Err(e) => return Err(map_io(e, prefix)),
        };
        while let Some(entry) = reader.next_entry().await.map_err(|e| map_io(e, prefix))? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&name_filter) {
                continue;
            }
            let is_dir = entry
                .file_type()
                .await
                .map_err(|e| map_io(e, prefix))?
                .is_dir();
            entries.push((name, is_dir));
        }
        entries.sort();

        let cap = page_size.max(1) as usize;
        let mut page = ListingPage::default();
        let mut taken = 0usize;
        let mut last_name: Option<&str> = None;
        let mut iter = entries
            .iter()
            .filter(|(name, _)| start.is_none_or(|c| name.as_str() > c))
            .peekable();
        while let Some((name, is_dir)) = iter.next() {
            if *is_dir {
                page.common_prefixes.push(format!("{dir_prefix}{name}/"));
            } else {
                page.keys.push(format!("{dir_prefix}{name}"));
            }
            taken += 1;
            last_name = Some(name.as_str());
            if taken >= cap && iter.peek().is_some() {
                page.truncated = true;
                break;
            }
        }
        page.next_cursor = if page.truncated {
            last_name.map(str::to_string)
        } else {
            None
        };
        Ok(page)
    }
}
