// src/ftp_store.rs
//
// FTP backend. The protocol is blocking and stateful, so one connection sits
// behind a mutex and every operation runs on the blocking pool. There is no
// server-side copy on FTP: copy_file downloads and re-uploads, and the source
// is always left in place. Multipart uploads stage numbered remote part files
// merged on completion, with the session id derived from the path.

use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use suppaftp::{FtpError, FtpStream, Status};
use tracing::{debug, info};

use crate::constants::STAGING_PART_EXTENSION;
use crate::error::{Result, StorageError};
use crate::filesystem::{Filesystem, ListingPage, ObjectMetadata, PartDescriptor, UploadSource};
use crate::multipart::part_integrity_tag;
use crate::path_utils::{file_name, normalize_separators, target_prefix};

/// Connection settings for one FTP server.
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Base directory on the server; paths are resolved under it.
    pub root: Option<String>,
}

impl FtpConfig {
    /// Read `FTP_HOST`, `FTP_USER`, `FTP_PASSWORD` and the optional
    /// `FTP_PORT` / `FTP_ROOT` from the environment.
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| -> Result<String> {
            std::env::var(name).map_err(|_| {
                StorageError::Configuration(format!("missing environment variable {name}"))
            })
        };
        let port = match std::env::var("FTP_PORT") {
            Ok(raw) => raw.parse().map_err(|_| {
                StorageError::Configuration(format!("FTP_PORT is not a port number: {raw}"))
            })?,
            Err(_) => 21,
        };
        Ok(Self {
            host: required("FTP_HOST")?,
            port,
            user: required("FTP_USER")?,
            password: required("FTP_PASSWORD")?,
            root: std::env::var("FTP_ROOT").ok(),
        })
    }
}

/// Filesystem over one logged-in FTP connection. The `container` argument is
/// ignored: the scope is fixed by `FtpConfig::root`.
pub struct FtpFilesystem {
    conn: Arc<Mutex<FtpStream>>,
    root: String,
}

impl FtpFilesystem {
    pub async fn connect(config: FtpConfig) -> Result<Self> {
        let root = config
            .root
            .as_deref()
            .unwrap_or("")
            .trim_matches('/')
            .to_string();
        let addr = format!("{}:{}", config.host, config.port);
        let stream = tokio::task::spawn_blocking(move || -> Result<FtpStream> {
            let mut stream = FtpStream::connect(&addr)
                .map_err(|e| map_ftp(e, &addr))?;
            stream
                .login(&config.user, &config.password)
                .map_err(|e| map_ftp(e, &addr))?;
            Ok(stream)
        })
        .await
        .map_err(|e| StorageError::Backend(anyhow::anyhow!("blocking ftp task failed: {e}")))??;
        info!(root = root.as_str(), "ftp connection established");
        Ok(Self {
            conn: Arc::new(Mutex::new(stream)),
            root,
        })
    }

    /// Resolve a logical path against the configured base directory.
    fn full(&self, path: &str) -> String {
        let path = normalize_separators(path);
        let path = path.trim_matches('/');
        if self.root.is_empty() {
            path.to_string()
        } else if path.is_empty() {
            self.root.clone()
        } else {
            format!("{}/{path}", self.root)
        }
    }

    fn staging(&self, path: &str, part_number: i32) -> String {
        self.full(&format!("{path}.{part_number}.{STAGING_PART_EXTENSION}"))
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Configuration("ftp connection poisoned".into()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Backend(anyhow::anyhow!("blocking ftp task failed: {e}")))?
    }
}

fn map_ftp(err: FtpError, what: &str) -> StorageError {
    match &err {
        FtpError::UnexpectedResponse(resp) if resp.status == Status::FileUnavailable => {
            StorageError::NotFound(what.to_string())
        }
        _ => StorageError::Backend(anyhow::Error::new(err).context(format!("ftp: {what}"))),
    }
}

/// Create each missing segment of `dir`. Existing segments answer with an
/// error the server is free to send, so failures here are ignored.
fn ensure_dirs(ftp: &mut FtpStream, dir: &str) {
    let mut acc = String::new();
    for segment in dir.split('/').filter(|s| !s.is_empty()) {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(segment);
        let _ = ftp.mkdir(&acc);
    }
}

fn is_directory(ftp: &mut FtpStream, path: &str) -> bool {
    let Ok(here) = ftp.pwd() else {
        return false;
    };
    if ftp.cwd(path).is_ok() {
        let _ = ftp.cwd(&here);
        true
    } else {
        false
    }
}

/// Child paths of `dir`, skipping the `.`/`..` entries some servers list.
fn children(ftp: &mut FtpStream, dir: &str) -> Result<Vec<String>> {
    let names = ftp.nlst(Some(dir)).map_err(|e| map_ftp(e, dir))?;
    Ok(names
        .into_iter()
        .map(|entry| {
            if entry.contains('/') {
                entry
            } else {
                format!("{dir}/{entry}")
            }
        })
        .filter(|child| {
            let leaf = file_name(child);
            leaf != "." && leaf != ".."
        })
        .collect())
}

fn remove_tree(ftp: &mut FtpStream, dir: &str) -> Result<()> {
    for child in children(ftp, dir)? {
        if ftp.rm(&child).is_err() {
            remove_tree(ftp, &child)?;
        }
    }
    ftp.rmdir(dir).map_err(|e| map_ftp(e, dir))
}

fn read_remote(ftp: &mut FtpStream, path: &str) -> Result<Vec<u8>> {
    let buf = ftp.retr_as_buffer(path).map_err(|e| map_ftp(e, path))?;
    Ok(buf.into_inner())
}

fn write_remote(ftp: &mut FtpStream, path: &str, data: &[u8]) -> Result<()> {
    if let Some((dir, _)) = path.rsplit_once('/') {
        ensure_dirs(ftp, dir);
    }
    ftp.put_file(path, &mut Cursor::new(data.to_vec()))
        .map_err(|e| map_ftp(e, path))?;
    Ok(())
}

#[async_trait]
impl Filesystem for FtpFilesystem {
    async fn mkdir(&self, path: &str, _container: Option<&str>) -> Result<()> {
        let full = self.full(path);
        self.with_conn(move |ftp| {
            ensure_dirs(ftp, &full);
            if is_directory(ftp, &full) {
                Ok(())
            } else {
                Err(StorageError::Backend(anyhow::anyhow!(
                    "mkdir {full} did not take effect"
                )))
            }
        })
        .await
    }

    async fn remove(&self, paths: &[&str], _container: Option<&str>) -> Result<()> {
        for &path in paths {
            let full = self.full(path);
            self.with_conn(move |ftp| {
                let rm_err = match ftp.rm(&full) {
                    Ok(()) => return Ok(()),
                    Err(e) => e,
                };
                if is_directory(ftp, &full) {
                    return remove_tree(ftp, &full);
                }
                // Only a genuinely absent path is a no-op; a denied or
                // failed delete of an existing file must surface.
                match map_ftp(rm_err, &full) {
                    StorageError::NotFound(_) => {
                        debug!(path = full.as_str(), "nothing to remove");
                        Ok(())
                    }
                    other => Err(other),
                }
            })
            .await?;
        }
        Ok(())
    }

    async fn rename(
        &self,
        old_names: &[&str],
        new_name: &str,
        _container: Option<&str>,
    ) -> Result<()> {
        let target_dir = self.full(target_prefix(new_name).trim_end_matches('/'));
        for &old in old_names {
            let full = self.full(old);
            let target_dir = target_dir.clone();
            let leaf = file_name(old).to_string();
            self.with_conn(move |ftp| {
                if !target_dir.is_empty() {
                    ensure_dirs(ftp, &target_dir);
                }
                let dest_of = |name: &str| {
                    if target_dir.is_empty() {
                        name.to_string()
                    } else {
                        format!("{target_dir}/{name}")
                    }
                };
                if is_directory(ftp, &full) {
                    // Members move under the target; the old directory goes.
                    for child in children(ftp, &full)? {
                        let dest = dest_of(file_name(&child));
                        ftp.rename(&child, &dest).map_err(|e| map_ftp(e, &child))?;
                    }
                    ftp.rmdir(&full).map_err(|e| map_ftp(e, &full))?;
                    Ok(())
                } else {
                    match ftp.rename(&full, &dest_of(&leaf)) {
                        Ok(()) => Ok(()),
                        // Absent old names are a no-op, like everywhere else.
                        Err(e) => match map_ftp(e, &full) {
                            StorageError::NotFound(_) => {
                                debug!(path = full.as_str(), "nothing to rename");
                                Ok(())
                            }
                            other => Err(other),
                        },
                    }
                }
            })
            .await?;
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &str,
        source: UploadSource<'_>,
        _container: Option<&str>,
    ) -> Result<()> {
        let full = self.full(path);
        let data = match source {
            UploadSource::Bytes(data) => data.to_vec(),
            UploadSource::LocalFile(file) => tokio::fs::read(file).await.map_err(|e| {
                StorageError::Configuration(format!(
                    "cannot read upload source {}: {e}",
                    file.display()
                ))
            })?,
        };
        self.with_conn(move |ftp| write_remote(ftp, &full, &data))
            .await
    }

    /// No server-side session exists; the id is a digest of the path.
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
        let staging = self.staging(path, part_number);
        let payload = data.to_vec();
        let e_tag = part_integrity_tag(data);
        self.with_conn(move |ftp| write_remote(ftp, &staging, &payload))
            .await?;
        Ok(PartDescriptor { part_number, e_tag })
    }

    async fn merge_multipart_upload(
        &self,
        path: &str,
        parts: &[PartDescriptor],
        _upload_id: Option<&str>,
        _container: Option<&str>,
    ) -> Result<()> {
        let full = self.full(path);
        let mut ordered = parts.to_vec();
        ordered.sort_by_key(|p| p.part_number);
        let staged: Vec<String> = ordered
            .iter()
            .map(|p| self.staging(path, p.part_number))
            .collect();
        let count = staged.len();
        self.with_conn(move |ftp| {
            let mut merged = Vec::new();
            for name in &staged {
                merged.extend_from_slice(&read_remote(ftp, name)?);
            }
            write_remote(ftp, &full, &merged)?;
            for name in &staged {
                ftp.rm(name).map_err(|e| map_ftp(e, name))?;
            }
            Ok(())
        })
        .await?;
        info!(path, parts = count, "merged staged parts");
        Ok(())
    }

    /// FTP has no part API for a local source; this is one whole upload.
    async fn multipart_upload_from_file(
        &self,
        path: &str,
        file: &Path,
        container: Option<&str>,
    ) -> Result<()> {
        self.upload_file(path, UploadSource::LocalFile(file), container)
            .await
    }

    async fn download_file(
        &self,
        path: &str,
        local: Option<&Path>,
        _container: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        let full = self.full(path);
        let data = self.with_conn(move |ftp| read_remote(ftp, &full)).await?;
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

    /// Download then re-upload; the source stays in place.
    async fn copy_file(
        &self,
        from: &str,
        to: &str,
        _from_container: Option<&str>,
        _to_container: Option<&str>,
    ) -> Result<()> {
        let from_full = self.full(from);
        let to_full = self.full(to);
        self.with_conn(move |ftp| {
            let data = read_remote(ftp, &from_full)?;
            write_remote(ftp, &to_full, &data)
        })
        .await
    }

    async fn file_meta(&self, path: &str, _container: Option<&str>) -> Result<ObjectMetadata> {
        let full = self.full(path);
        self.with_conn(move |ftp| {
            let size = ftp.size(&full).map_err(|e| map_ftp(e, &full))? as u64;
            let last_modified = ftp
                .mdtm(&full)
                .ok()
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
            Ok(ObjectMetadata {
                size,
                content_type: None,
                last_modified,
                e_tag: None,
            })
        })
        .await
    }

    /// Directory listing shaped like a delimiter page, paginated by entry
    /// name. Entries the server reports in a format the LIST parser does not
    /// understand are skipped.
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
        let dir_prefix = target_prefix(&dir_part);
        let dir_full = self.full(&dir_part);

        let lines = self
            .with_conn(move |ftp| {
                if !dir_full.is_empty() && !is_directory(ftp, &dir_full) {
                    return Ok(Vec::new());
                }
                ftp.list(if dir_full.is_empty() {
                    None
                } else {
                    Some(&dir_full)
                })
                .map_err(|e| map_ftp(e, &dir_full))
            })
            .await?;

        let mut entries: Vec<(String, bool)> = lines
            .iter()
            .filter_map(|line| suppaftp::list::File::try_from(line.as_str()).ok())
            .filter(|f| {
                let name = f.name();
                name != "." && name != ".." && name.starts_with(&name_filter)
            })
            .map(|f| (f.name().to_string(), f.is_directory()))
            .collect();
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

#[cfg(test)]
mod tests {
    use super::*;
    use suppaftp::types::Response;

    #[test]
    fn absent_path_maps_to_not_found() {
        let err = map_ftp(
            FtpError::UnexpectedResponse(Response {
                status: Status::FileUnavailable,
                body: b"550 no such file".to_vec(),
            }),
            "dir/f.txt",
        );
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn other_failures_stay_backend_errors() {
        let err = map_ftp(
            FtpError::UnexpectedResponse(Response {
                status: Status::BadCommand,
                body: b"500 refused".to_vec(),
            }),
            "dir/f.txt",
        );
        assert!(matches!(err, StorageError::Backend(_)));
    }
}
