//! Error types module
//!
//! Every failure a transfer run can end with is a `TransferError` variant. The
//! pipeline never wraps one error inside another: whatever stage failed first
//! is what the caller receives, so the terminal report can name that stage.

use std::io;

/// Which part of a run produced an error. Used for terminal reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailingComponent {
    /// Request validation and scratch workspace setup
    Setup,
    Source,
    Transform,
    Sink,
    /// Caller-initiated cancellation or timeout
    Caller,
}

impl std::fmt::Display for FailingComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailingComponent::Setup => "setup",
            FailingComponent::Source => "source",
            FailingComponent::Transform => "transform",
            FailingComponent::Sink => "upload",
            FailingComponent::Caller => "cancellation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Source interrupted: {0}")]
    SourceInterrupted(String),

    #[error("Transform failed ({}): {detail}", describe_exit(.code, .signal))]
    TransformFailed {
        code: Option<i32>,
        signal: Option<i32>,
        detail: String,
    },

    #[error("Upload rejected: {0}")]
    SinkRejected(String),

    #[error("Upload interrupted: {0}")]
    SinkInterrupted(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient disk space: {available} bytes available, {required} bytes required")]
    InsufficientDiskSpace { available: u64, required: u64 },

    #[error("Workspace I/O error: {0}")]
    Io(#[from] io::Error),
}

fn describe_exit(code: &Option<i32>, signal: &Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(signal)) => format!("killed by signal {}", signal),
        (None, None) => "did not run".to_string(),
    }
}

/// Result type for transfer operations
pub type TransferResult<T> = Result<T, TransferError>;

impl TransferError {
    /// Machine-readable error code (e.g., "SOURCE_UNAVAILABLE")
    pub fn error_code(&self) -> &'static str {
        match self {
            TransferError::SourceUnavailable(_) => "SOURCE_UNAVAILABLE",
            TransferError::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            TransferError::SourceInterrupted(_) => "SOURCE_INTERRUPTED",
            TransferError::TransformFailed { .. } => "TRANSFORM_FAILED",
            TransferError::SinkRejected(_) => "SINK_REJECTED",
            TransferError::SinkInterrupted(_) => "SINK_INTERRUPTED",
            TransferError::Cancelled => "CANCELLED",
            TransferError::InvalidRequest(_) => "INVALID_REQUEST",
            TransferError::InsufficientDiskSpace { .. } => "INSUFFICIENT_DISK_SPACE",
            TransferError::Io(_) => "WORKSPACE_IO",
        }
    }

    pub fn component(&self) -> FailingComponent {
        match self {
            TransferError::SourceUnavailable(_)
            | TransferError::SourceNotFound(_)
            | TransferError::SourceInterrupted(_) => FailingComponent::Source,
            TransferError::TransformFailed { .. } => FailingComponent::Transform,
            TransferError::SinkRejected(_) | TransferError::SinkInterrupted(_) => {
                FailingComponent::Sink
            }
            TransferError::Cancelled => FailingComponent::Caller,
            TransferError::InvalidRequest(_)
            | TransferError::InsufficientDiskSpace { .. }
            | TransferError::Io(_) => FailingComponent::Setup,
        }
    }

    /// Whether restarting the whole run might succeed.
    ///
    /// Nothing inside the pipeline acts on this; it only informs the caller.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            TransferError::SourceUnavailable(_)
                | TransferError::SourceInterrupted(_)
                | TransferError::SinkInterrupted(_)
        )
    }

    /// Ranking used when several stages of one run fail together. Lower wins.
    ///
    /// A downstream stage usually fails *because* an upstream one did, so the
    /// upstream error is the originating cause.
    pub fn origin_rank(&self) -> u8 {
        match self.component() {
            FailingComponent::Caller => 0,
            FailingComponent::Setup => 1,
            FailingComponent::Source => 2,
            FailingComponent::Transform => 3,
            FailingComponent::Sink => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_failed_display_with_exit_code() {
        let err = TransferError::TransformFailed {
            code: Some(1),
            signal: None,
            detail: "Stream map '0:a:m:language:eng' matches no streams".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("matches no streams"));
    }

    #[test]
    fn test_transform_failed_display_with_signal() {
        let err = TransferError::TransformFailed {
            code: None,
            signal: Some(9),
            detail: String::new(),
        };
        assert!(err.to_string().contains("killed by signal 9"));
    }

    #[test]
    fn test_component_mapping() {
        assert_eq!(
            TransferError::SourceNotFound("x".into()).component(),
            FailingComponent::Source
        );
        assert_eq!(
            TransferError::SinkRejected("x".into()).component(),
            FailingComponent::Sink
        );
        assert_eq!(TransferError::Cancelled.component(), FailingComponent::Caller);
        assert_eq!(FailingComponent::Sink.to_string(), "upload");
    }

    #[test]
    fn test_origin_rank_prefers_upstream() {
        let source = TransferError::SourceInterrupted("reset".into());
        let sink = TransferError::SinkInterrupted("timeout".into());
        let transform = TransferError::TransformFailed {
            code: Some(1),
            signal: None,
            detail: String::new(),
        };
        assert!(source.origin_rank() < transform.origin_rank());
        assert!(transform.origin_rank() < sink.origin_rank());
        assert!(TransferError::Cancelled.origin_rank() < source.origin_rank());
    }

    #[test]
    fn test_retriable() {
        assert!(TransferError::SinkInterrupted("x".into()).is_retriable());
        assert!(!TransferError::SinkRejected("x".into()).is_retriable());
        assert!(!TransferError::Cancelled.is_retriable());
    }
}
