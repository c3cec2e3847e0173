use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Lifecycle of a single transfer run.
///
/// `Idle → Fetching → Transforming → Uploading → Done`; `Failed` is reachable
/// from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Fetching,
    Transforming,
    Uploading,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Stream-to-stream runs move through every stage at once, so forward
    /// jumps are allowed; going backwards or leaving a terminal state is not.
    pub fn can_transition_to(self, next: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == RunState::Failed {
            return true;
        }
        next.ordinal() > self.ordinal()
    }

    fn ordinal(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Fetching => 1,
            RunState::Transforming => 2,
            RunState::Uploading => 3,
            RunState::Done => 4,
            RunState::Failed => 5,
        }
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Fetching => "fetching",
            RunState::Transforming => "transforming",
            RunState::Uploading => "uploading",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How the source, transcoder and uploader are wired together.
///
/// Chosen by the caller; the coordinator never infers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topology {
    /// Source → transcoder pipes → uploader. No disk artifact; output must be
    /// a fragmented (non-seekable) container.
    StreamToStream,
    /// Transcoder reads the locator itself and writes a local file, which is
    /// then uploaded.
    RemoteReadToFile,
    /// Source downloaded to disk, transcoded file to file, output uploaded.
    DownloadTransformUpload,
}

impl Topology {
    /// Whether the run writes artifacts to the scratch directory.
    pub fn uses_disk(self) -> bool {
        !matches!(self, Topology::StreamToStream)
    }

    /// How many copies of the media are on disk at peak, used for capacity estimates.
    pub fn peak_disk_copies(self) -> u64 {
        match self {
            Topology::StreamToStream => 0,
            Topology::RemoteReadToFile => 1,
            Topology::DownloadTransformUpload => 2,
        }
    }
}

impl FromStr for Topology {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stream" | "stream-to-stream" => Ok(Topology::StreamToStream),
            "remote-file" | "remote-read-to-file" => Ok(Topology::RemoteReadToFile),
            "download" | "download-transform-upload" => Ok(Topology::DownloadTransformUpload),
            _ => Err(anyhow::anyhow!(
                "Invalid topology: {} (expected stream, remote-file or download)",
                s
            )),
        }
    }
}

impl Display for Topology {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Topology::StreamToStream => write!(f, "stream"),
            Topology::RemoteReadToFile => write!(f, "remote-file"),
            Topology::DownloadTransformUpload => write!(f, "download"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(RunState::Idle.can_transition_to(RunState::Fetching));
        assert!(RunState::Fetching.can_transition_to(RunState::Uploading));
        assert!(RunState::Uploading.can_transition_to(RunState::Done));
    }

    #[test]
    fn test_backward_and_terminal_transitions_rejected() {
        assert!(!RunState::Uploading.can_transition_to(RunState::Fetching));
        assert!(!RunState::Done.can_transition_to(RunState::Failed));
        assert!(!RunState::Failed.can_transition_to(RunState::Idle));
    }

    #[test]
    fn test_failed_reachable_from_any_non_terminal() {
        for state in [
            RunState::Idle,
            RunState::Fetching,
            RunState::Transforming,
            RunState::Uploading,
        ] {
            assert!(state.can_transition_to(RunState::Failed));
        }
    }

    #[test]
    fn test_topology_parse_round_trip() {
        for topology in [
            Topology::StreamToStream,
            Topology::RemoteReadToFile,
            Topology::DownloadTransformUpload,
        ] {
            let parsed: Topology = topology.to_string().parse().unwrap();
            assert_eq!(parsed, topology);
        }
        assert!("sideways".parse::<Topology>().is_err());
    }
}
