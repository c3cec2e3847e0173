//! Pipeline coordinator: wires source, transcoder and uploader per run.

mod coordinator;
mod workspace;

pub use coordinator::{Coordinator, TransferOutcome};
pub use workspace::RunWorkspace;
