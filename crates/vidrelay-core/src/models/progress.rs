use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Pipeline stage a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Downloading,
    Transcoding,
    Uploading,
}

impl Stage {
    fn slot(self) -> usize {
        match self {
            Stage::Downloading => 0,
            Stage::Transcoding => 1,
            Stage::Uploading => 2,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Downloading => write!(f, "downloading"),
            Stage::Transcoding => write!(f, "transcoding"),
            Stage::Uploading => write!(f, "uploading"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub bytes_transferred: u64,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
}

/// Observation channel for progress events.
///
/// Cloned into every stage of a run. Cumulative byte counts are clamped per
/// stage so observers never see a value go backwards, even when the
/// transcoder reports a smaller size than it did before. A dropped receiver
/// or a disabled reporter is not an error: progress has no effect on control
/// flow.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sender: Option<UnboundedSender<ProgressEvent>>,
    high_water: Arc<[AtomicU64; 3]>,
}

impl ProgressReporter {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self {
            sender: Some(sender),
            high_water: Arc::default(),
        }
    }

    /// A reporter that drops every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn report(&self, stage: Stage, bytes_transferred: u64, percent: Option<f64>) {
        let previous = self.high_water[stage.slot()].fetch_max(bytes_transferred, Ordering::AcqRel);
        let bytes_transferred = previous.max(bytes_transferred);
        let percent = percent.map(|p| p.clamp(0.0, 100.0));

        tracing::trace!(
            stage = %stage,
            bytes_transferred = bytes_transferred,
            percent = ?percent,
            "progress"
        );

        if let Some(sender) = &self.sender {
            let _ = sender.send(ProgressEvent {
                bytes_transferred,
                stage,
                percent,
            });
        }
    }

    /// Highest cumulative value reported so far for a stage.
    pub fn last_reported(&self, stage: Stage) -> u64 {
        self.high_water[stage.slot()].load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.sender.is_some())
            .finish()
    }
}
