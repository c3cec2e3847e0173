//! Vidrelay Storage Library
//!
//! This crate provides the object-storage abstraction used by the transfer
//! pipeline, its S3-compatible and local-filesystem backends, the multipart
//! uploader (the pipeline's sink) and the bucket usage reporter.
//!
//! # Visibility guarantee
//!
//! Objects written through [`MultipartUploader`] only become visible to
//! [`ObjectStorage::list_objects_page`] once every part has been uploaded and
//! the upload has been completed. Failed or cancelled uploads are aborted, so
//! a partial object is never exposed.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;
pub mod upload;
pub mod usage;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::validate_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{
    ListPage, ObjectStorage, ObjectSummary, StorageError, StorageResult, UploadedPart,
};
pub use upload::{MultipartUploader, StagedUpload, UploadReceipt};
pub use usage::BucketUsageReporter;
pub use vidrelay_core::StorageBackend;
