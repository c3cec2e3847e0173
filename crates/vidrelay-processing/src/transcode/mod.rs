//! `ffmpeg` wrapper.
//!
//! The transcoder is an owned child process: a declarative option list goes
//! in, progress comes back asynchronously on stderr, and the exit status is
//! the single completion signal.

mod args;
mod progress;
mod service;

pub use args::{build_args, TranscodeInput, TranscodeOutput};
pub use progress::{ProgressParser, ProgressUpdate};
pub use service::{RunningTranscode, TranscodeJob, TranscodeService};
