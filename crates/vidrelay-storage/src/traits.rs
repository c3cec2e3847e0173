//! Storage abstraction trait
//!
//! This module defines the `ObjectStorage` trait that all storage backends must
//! implement. The surface is exactly what the transfer sink and the usage
//! reporter need: multipart writes with an explicit commit/abort step, and
//! paginated listing.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use vidrelay_core::TransferError;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Credentials, permissions or bucket were refused by the backend
    #[error("Storage rejected the request: {0}")]
    Rejected(String),

    /// Network failure, timeout or 5xx; the operation might succeed if retried
    #[error("Storage request interrupted: {0}")]
    Interrupted(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Unknown multipart upload: {0}")]
    NoSuchUpload(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::Interrupted(_) | StorageError::IoError(_))
    }
}

impl From<StorageError> for TransferError {
    fn from(err: StorageError) -> Self {
        if err.is_retriable() {
            TransferError::SinkInterrupted(err.to_string())
        } else {
            TransferError::SinkRejected(err.to_string())
        }
    }
}

/// Receipt for one uploaded part. Needed to complete the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    /// 1-based, contiguous within one upload
    pub part_number: i32,
    pub e_tag: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: u64,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Present when more pages follow
    pub next_continuation_token: Option<String>,
}

/// Storage abstraction trait
///
/// All storage backends (S3-compatible, local filesystem) must implement this
/// trait. An object written through the multipart methods must not be listed
/// or readable until `complete_multipart` returns successfully.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Bucket (or root directory) this client writes to, for reporting
    fn bucket(&self) -> &str;

    /// Start a multipart upload and return its upload id
    async fn create_multipart(&self, key: &str, content_type: &str) -> StorageResult<String>;

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<UploadedPart>;

    /// Assemble the parts into the final object, making it visible.
    ///
    /// `parts` must be ordered by part number.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<()>;

    /// Discard an upload and every part staged for it
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()>;

    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> StorageResult<ListPage>;

    /// Get the size in bytes of an object, if it exists.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_maps_to_sink_errors() {
        let interrupted: TransferError = StorageError::Interrupted("timeout".into()).into();
        assert!(matches!(interrupted, TransferError::SinkInterrupted(_)));

        let rejected: TransferError = StorageError::Rejected("AccessDenied".into()).into();
        assert!(matches!(rejected, TransferError::SinkRejected(_)));

        let bad_key: TransferError = StorageError::InvalidKey("..".into()).into();
        assert!(matches!(bad_key, TransferError::SinkRejected(_)));
    }
}
