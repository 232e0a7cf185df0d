// src/error.rs
//
// Error taxonomy shared by every backend. Backend adapters propagate their
// SDK-level causes as `anyhow::Error` sources so the chain stays inspectable.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The path names neither an object nor anything a backend can resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// A page fetch failed while enumerating a prefix. The recursive
    /// operation that needed the listing was aborted before mutating anything
    /// at this level.
    #[error("listing failed under prefix '{prefix}'")]
    Listing {
        prefix: String,
        #[source]
        source: anyhow::Error,
    },

    /// One chunk of a bulk delete/rename failed. Chunks before `batch` were
    /// already applied and are not rolled back.
    #[error("batch {batch} failed after {applied} item(s) were applied")]
    BatchMutation {
        batch: usize,
        applied: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A part upload, ranged copy or completion call failed. The session is
    /// dead; the caller must initiate a new one. No abort is issued, so the
    /// backend may retain orphaned session state.
    #[error("multipart session '{session}' failed")]
    Multipart {
        session: String,
        #[source]
        source: anyhow::Error,
    },

    /// The backend-reported integrity tag for a part did not match the locally
    /// computed one, twice in a row (one retry is built in).
    #[error("part {part_number} integrity mismatch: expected {expected}, backend reported {actual}")]
    IntegrityMismatch {
        part_number: i32,
        expected: String,
        actual: String,
    },

    /// Missing container, unusable destination, bad backend settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Any other backend-level failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StorageError {
    pub(crate) fn not_found(container: &str, key: &str) -> Self {
        if container.is_empty() {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::NotFound(format!("{container}/{key}"))
        }
    }

    /// True when retrying the same call cannot succeed without new input.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
