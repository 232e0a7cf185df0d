// src/s3_compat.rs
//
// One wire client for every provider speaking the S3 dialect (Aliyun OSS,
// Tencent COS, Qiniu Kodo). Providers differ only by endpoint, credentials
// and their `ProviderProfile`; the request shapes are identical.

use anyhow::Context;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use once_cell::sync::Lazy;
use tracing::info;

use crate::constants::{DEFAULT_REGION, OSS_LIST_PAGE_SIZE};
use crate::error::{Result, StorageError};
use crate::filesystem::{ListingPage, ObjectMetadata, PartDescriptor};
use crate::multipart::PartRange;
use crate::object_client::{ObjectClient, ProviderProfile};
use crate::object_fs::ObjectFilesystem;

// Load .env once, before the first credential read.
static ENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

/// Connection settings for one S3-dialect endpoint.
#[derive(Debug, Clone)]
pub struct S3CompatConfig {
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: String,
    pub region: Option<String>,
    pub default_container: Option<String>,
}

impl S3CompatConfig {
    /// Read `{PREFIX}_ACCESS_KEY`, `{PREFIX}_SECRET_KEY`, `{PREFIX}_ENDPOINT`
    /// and the optional `{PREFIX}_REGION` / `{PREFIX}_BUCKET` from the
    /// environment (a `.env` file is honored).
    pub fn from_env(prefix: &str) -> Result<Self> {
        Lazy::force(&ENV_LOADED);
        let required = |name: &str| -> Result<String> {
            let full = format!("{prefix}_{name}");
            std::env::var(&full).map_err(|_| {
                StorageError::Configuration(format!("missing environment variable {full}"))
            })
        };
        Ok(Self {
            access_key: required("ACCESS_KEY")?,
            secret_key: required("SECRET_KEY")?,
            endpoint: required("ENDPOINT")?,
            region: std::env::var(format!("{prefix}_REGION")).ok(),
            default_container: std::env::var(format!("{prefix}_BUCKET")).ok(),
        })
    }
}

/// S3-dialect `ObjectClient`. Path-style addressing is forced because the
/// compatible endpoints do not all resolve virtual-hosted buckets.
pub struct S3CompatClient {
    client: aws_sdk_s3::Client,
    profile: ProviderProfile,
}

impl S3CompatClient {
    pub async fn connect(config: S3CompatConfig, profile: ProviderProfile) -> Result<Self> {
        Lazy::force(&ENV_LOADED);
        let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
            .or_else(Region::new(DEFAULT_REGION));
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "omnifs-static",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .endpoint_url(&config.endpoint)
            .force_path_style(true)
            .build();
        let profile = profile.with_default_container(config.default_container.clone());
        info!(
            provider = profile.name,
            endpoint = config.endpoint.as_str(),
            "connected S3-dialect client"
        );
        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            profile,
        })
    }
}

fn copy_source(container: &str, key: &str) -> String {
    format!("{container}/{key}")
}

#[async_trait]
impl ObjectClient for S3CompatClient {
    fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    async fn exists(&self, container: &str, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(
                        anyhow::Error::new(service).context(format!("head {container}/{key}")),
                    ))
                }
            }
        }
    }

    async fn head(&self, container: &str, key: &str) -> Result<ObjectMetadata> {
        let out = match self
            .client
            .head_object()
            .bucket(container)
            .key(key)
            .send()
            .await
        {
            Ok(out) => out,
            Err(err) => {
                let service = err.into_service_error();
                return if service.is_not_found() {
                    Err(StorageError::not_found(container, key))
                } else {
                    Err(StorageError::Backend(
                        anyhow::Error::new(service).context(format!("head {container}/{key}")),
                    ))
                };
            }
        };
        Ok(ObjectMetadata {
            size: out.content_length().unwrap_or_default().max(0) as u64,
            content_type: out.content_type().map(str::to_string),
            last_modified: out
                .last_modified()
                .and_then(|t| chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
            e_tag: out.e_tag().map(str::to_string),
        })
    }

    async fn put(&self, container: &str, key: &str, data: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(container)
            .key(key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .with_context(|| format!("put {container}/{key}"))
            .map_err(StorageError::Backend)?;
        Ok(())
    }

    async fn get(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        let out = match self
            .client
            .get_object()
            .bucket(container)
            .key(key)
            .send()
            .await
        {
            Ok(out) => out,
            Err(err) => {
                let service = err.into_service_error();
                return if service.is_no_such_key() {
                    Err(StorageError::not_found(container, key))
                } else {
                    Err(StorageError::Backend(
                        anyhow::Error::new(service).context(format!("get {container}/{key}")),
                    ))
                };
            }
        };
        let bytes = out
            .body
            .collect()
            .await
            .with_context(|| format!("read body of {container}/{key}"))
            .map_err(StorageError::Backend)?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn delete(&self, container: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(container)
            .key(key)
            .send()
            .await
            .with_context(|| format!("delete {container}/{key}"))
            .map_err(StorageError::Backend)?;
        Ok(())
    }

    async fn delete_batch(&self, container: &str, keys: &[String]) -> Result<()> {
        let objects: Vec<ObjectIdentifier> = keys
            .iter()
            .map(|k| ObjectIdentifier::builder().key(k).build())
            .collect::<std::result::Result<_, _>>()
            .context("build delete identifiers")
            .map_err(StorageError::Backend)?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .context("build bulk delete request")
            .map_err(StorageError::Backend)?;
        let out = self
            .client
            .delete_objects()
            .bucket(container)
            .delete(delete)
            .send()
            .await
            .with_context(|| format!("bulk delete {} key(s) in {container}", keys.len()))
            .map_err(StorageError::Backend)?;
        if let Some(first) = out.errors().first() {
            return Err(StorageError::Backend(anyhow::anyhow!(
                "bulk delete rejected key {:?}: {} {}",
                first.key().unwrap_or("<unknown>"),
                first.code().unwrap_or("<no code>"),
                first.message().unwrap_or("")
            )));
        }
        Ok(())
    }

    async fn copy(
        &self,
        from_container: &str,
        from_key: &str,
        to_container: &str,
        to_key: &str,
    ) -> Result<()> {
        self.client
            .copy_object()
            .copy_source(copy_source(from_container, from_key))
            .bucket(to_container)
            .key(to_key)
            .send()
            .await
            .with_context(|| format!("copy {from_container}/{from_key} -> {to_container}/{to_key}"))
            .map_err(StorageError::Backend)?;
        Ok(())
    }

    async fn create_session(&self, container: &str, key: &str) -> Result<String> {
        let out = self
            .client
            .create_multipart_upload()
            .bucket(container)
            .key(key)
            .send()
            .await
            .with_context(|| format!("initiate multipart for {container}/{key}"))
            .map_err(StorageError::Backend)?;
        out.upload_id()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Backend(anyhow::anyhow!("backend returned no upload id")))
    }

    async fn upload_part(
        &self,
        container: &str,
        key: &str,
        session: &str,
        part_number: i32,
        data: &[u8],
    ) -> Result<PartDescriptor> {
        let out = self
            .client
            .upload_part()
            .bucket(container)
            .key(key)
            .upload_id(session)
            .part_number(part_number)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .with_context(|| format!("upload part {part_number} of {container}/{key}"))
            .map_err(StorageError::Backend)?;
        let e_tag = out
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| StorageError::Backend(anyhow::anyhow!("part {part_number} returned no etag")))?;
        Ok(PartDescriptor { part_number, e_tag })
    }

    async fn copy_part_range(
        &self,
        from_container: &str,
        from_key: &str,
        to_container: &str,
        to_key: &str,
        session: &str,
        part: &PartRange,
    ) -> Result<PartDescriptor> {
        // HTTP ranges are inclusive on both ends, so there is no way to
        // express an empty range.
        if part.length == 0 {
            return Err(StorageError::Configuration(format!(
                "zero-length copy range for part {}",
                part.part_number
            )));
        }
        let range = format!("bytes={}-{}", part.offset, part.offset + part.length - 1);
        let out = self
            .client
            .upload_part_copy()
            .copy_source(copy_source(from_container, from_key))
            .copy_source_range(range)
            .bucket(to_container)
            .key(to_key)
            .upload_id(session)
            .part_number(part.part_number)
            .send()
            .await
            .with_context(|| format!("copy range part {} of {to_container}/{to_key}", part.part_number))
            .map_err(StorageError::Backend)?;
        let e_tag = out
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .map(str::to_string)
            .ok_or_else(|| {
                StorageError::Backend(anyhow::anyhow!(
                    "copied part {} returned no etag",
                    part.part_number
                ))
            })?;
        Ok(PartDescriptor {
            part_number: part.part_number,
            e_tag,
        })
    }

    async fn complete_session(
        &self,
        container: &str,
        key: &str,
        session: &str,
        parts: &[PartDescriptor],
    ) -> Result<()> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.e_tag)
                    .build()
            })
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(container)
            .key(key)
            .upload_id(session)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .with_context(|| format!("complete multipart for {container}/{key}"))
            .map_err(StorageError::Backend)?;
        Ok(())
    }

    async fn list_page(
        &self,
        container: &str,
        prefix: &str,
        cursor: Option<&str>,
        page_size: i32,
    ) -> Result<ListingPage> {
        let out = self
            .client
            .list_objects_v2()
            .bucket(container)
            .prefix(prefix)
            .delimiter("/")
            .max_keys(page_size)
            .set_continuation_token(cursor.map(str::to_string))
            .send()
            .await
            .with_context(|| format!("list page under {container}/{prefix}"))
            .map_err(StorageError::Backend)?;
        Ok(ListingPage {
            keys: out
                .contents()
                .iter()
                .filter_map(|o| o.key().map(str::to_string))
                .collect(),
            common_prefixes: out
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            truncated: out.is_truncated().unwrap_or(false),
            next_cursor: out.next_continuation_token().map(str::to_string),
        })
    }
}

/// Aliyun OSS through its S3-compatible endpoint. OSS caps delimiter listings
/// at 100 keys per page.
pub async fn aliyun_oss(config: S3CompatConfig) -> Result<ObjectFilesystem<S3CompatClient>> {
    let profile = ProviderProfile::new("aliyun-oss").with_list_page_size(OSS_LIST_PAGE_SIZE);
    Ok(ObjectFilesystem::new(
        S3CompatClient::connect(config, profile).await?,
    ))
}

/// Tencent COS through its S3-compatible endpoint.
pub async fn tencent_cos(config: S3CompatConfig) -> Result<ObjectFilesystem<S3CompatClient>> {
    let profile = ProviderProfile::new("tencent-cos");
    Ok(ObjectFilesystem::new(
        S3CompatClient::connect(config, profile).await?,
    ))
}

/// Qiniu Kodo through its S3-compatible endpoint.
pub async fn qiniu_kodo(config: S3CompatConfig) -> Result<ObjectFilesystem<S3CompatClient>> {
    let profile = ProviderProfile::new("qiniu-kodo");
    Ok(ObjectFilesystem::new(
        S3CompatClient::connect(config, profile).await?,
    ))
}
