// src/constants.rs
//
// Centralized constants for omnifs to avoid hardcoded values throughout the codebase.

/// Objects above this size are copied with a ranged multipart copy instead of
/// one whole-object copy call (1 GiB).
pub const MULTIPART_COPY_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Chunk size for ranged multipart copies (10 MiB). The last chunk absorbs the
/// remainder.
pub const COPY_PART_SIZE: u64 = 10 * 1024 * 1024;

/// Default part size for multipart uploads (5 MiB, the S3-dialect minimum).
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum keys per bulk-delete call.
pub const DELETE_BATCH_LIMIT: usize = 1000;

/// Maximum key pairs per rename batch.
pub const RENAME_BATCH_LIMIT: usize = 1000;

/// Default page size for delimiter listings.
pub const DEFAULT_LIST_PAGE_SIZE: i32 = 1000;

/// Aliyun OSS caps delimiter listings at 100 keys per page.
pub const OSS_LIST_PAGE_SIZE: i32 = 100;

/// Maximum in-flight part uploads per multipart session.
pub const PART_UPLOAD_CONCURRENCY: usize = 16;

/// Extension for staged part files on backends without native multipart.
pub const STAGING_PART_EXTENSION: &str = "part";

/// Region fallback when neither config nor environment supplies one.
pub const DEFAULT_REGION: &str = "us-east-1";
