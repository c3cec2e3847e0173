//! Data models for the transfer pipeline
//!
//! Plain data only; behavior lives in the storage and processing crates.

mod progress;
mod run;
mod tracks;
mod usage;

pub use progress::{ProgressEvent, ProgressReporter, Stage};
pub use run::{RunState, Topology};
pub use tracks::{AudioSelection, TrackSelectionSpec, VideoSelection};
pub use usage::UsageSummary;
