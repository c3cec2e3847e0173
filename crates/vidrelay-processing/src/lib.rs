//! Vidrelay Processing Library
//!
//! The transfer pipeline: a source reader (HTTP or local file), an `ffmpeg`
//! remux stage driven by a declarative track selection, and a coordinator
//! that wires both to the multipart uploader under one of three topologies.

pub mod pipeline;
pub mod request;
pub mod source;
pub mod transcode;

pub use pipeline::{Coordinator, TransferOutcome};
pub use request::{SourceLocator, TransferRequest};
pub use source::{OpenedSource, SourceReader};
pub use transcode::{TranscodeInput, TranscodeJob, TranscodeOutput, TranscodeService};
