//! Vidrelay Core Library
//!
//! This crate provides the domain models, error taxonomy and configuration
//! shared by every vidrelay component: the storage backends, the transfer
//! pipeline and the command-line binaries.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{DiskCheckBehavior, S3Settings, TransferConfig};
pub use error::{FailingComponent, TransferError, TransferResult};
pub use models::{
    AudioSelection, ProgressEvent, ProgressReporter, RunState, Stage, Topology,
    TrackSelectionSpec, UsageSummary, VideoSelection,
};
pub use storage_types::StorageBackend;
