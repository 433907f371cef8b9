//! Object storage seam used by the image optimization job.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object path `{path}`: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("storage API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("storage request failed: {0}")]
    Transport(String),
    #[error("storage response could not be decoded: {0}")]
    Decode(String),
}

impl StorageError {
    pub fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason,
        }
    }
}

/// A stored object as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Slash-separated path relative to the store root or bucket.
    pub path: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object below `prefix`, recursing into folders.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError>;

    async fn download(&self, path: &str) -> Result<Bytes, StorageError>;

    /// Create or replace the object at `path`.
    async fn upload(&self, path: &str, body: Bytes) -> Result<(), StorageError>;

    async fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// Content type for an object path, falling back to `application/octet-stream`.
pub fn content_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
