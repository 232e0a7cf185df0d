// src/lib.rs
//
// omnifs: one filesystem contract over S3-dialect object stores, FTP and
// local disk. Hierarchy on flat key stores is emulated by the shared paging,
// tree and batching modules; backends plug in under `ObjectClient` or
// implement `Filesystem` directly.

pub mod batch;
pub mod constants;
pub mod error;
pub mod file_store;
pub mod filesystem;
pub mod ftp_store;
pub mod memory;
pub mod multipart;
pub mod object_client;
pub mod object_fs;
pub mod paging;
pub mod path_utils;
pub mod s3_compat;
pub mod tree_ops;

pub use error::{Result, StorageError};
pub use file_store::LocalFilesystem;
pub use filesystem::{Filesystem, ListingPage, ObjectMetadata, PartDescriptor, UploadSource};
pub use ftp_store::{FtpConfig, FtpFilesystem};
pub use memory::MemoryClient;
pub use object_client::{ObjectClient, ProviderProfile};
pub use object_fs::ObjectFilesystem;
pub use s3_compat::{aliyun_oss, qiniu_kodo, tencent_cos, S3CompatClient, S3CompatConfig};
