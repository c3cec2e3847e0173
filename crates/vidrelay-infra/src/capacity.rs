use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::{error, warn};

use vidrelay_core::{DiskCheckBehavior, Topology, TransferConfig, TransferError, TransferResult};

/// Checks the scratch directory has room for a run's on-disk artifacts.
#[derive(Debug, Clone)]
pub struct CapacityChecker {
    min_free_bytes: u64,
    behavior: DiskCheckBehavior,
    space_multiplier: f64,
    default_source_size: u64,
}

impl CapacityChecker {
    pub fn new(config: &TransferConfig) -> Self {
        Self {
            min_free_bytes: config.min_disk_free_bytes(),
            behavior: config.disk_check_behavior,
            space_multiplier: config.transcode_space_multiplier,
            default_source_size: config.default_source_size_bytes,
        }
    }

    /// Estimate disk needed by a topology's artifacts.
    ///
    /// Each artifact is estimated at `source size × multiplier`; the source
    /// size falls back to the configured default when no hint is known.
    pub fn estimate_artifact_bytes(&self, topology: Topology, size_hint: Option<u64>) -> u64 {
        let source_size = size_hint.unwrap_or(self.default_source_size);
        let copies = topology.peak_disk_copies() as f64;
        (source_size as f64 * self.space_multiplier * copies).ceil() as u64
    }

    /// Check if there's enough disk space at the given path
    pub fn check_disk_space(&self, path: &Path, required_bytes: u64) -> TransferResult<()> {
        let Some(available_bytes) = available_space(path) else {
            warn!(
                path = %path.display(),
                "Could not determine disk space for path, skipping capacity check"
            );
            return Ok(());
        };
        self.evaluate(path, available_bytes, required_bytes)
    }

    /// Check if there's enough disk space (async; runs sync check in spawn_blocking to avoid blocking the runtime).
    pub async fn check_disk_space_async(
        &self,
        path: &Path,
        required_bytes: u64,
    ) -> TransferResult<()> {
        let path = path.to_path_buf();
        let checker = self.clone();
        tokio::task::spawn_blocking(move || checker.check_disk_space(&path, required_bytes))
            .await
            .map_err(|e| {
                TransferError::Io(std::io::Error::other(format!(
                    "spawn_blocking for disk space check: {}",
                    e
                )))
            })?
    }

    fn evaluate(&self, path: &Path, available_bytes: u64, required_bytes: u64) -> TransferResult<()> {
        let total_required = required_bytes.saturating_add(self.min_free_bytes);
        if available_bytes >= total_required {
            return Ok(());
        }

        match self.behavior {
            DiskCheckBehavior::Fail => {
                error!(
                    available_bytes = available_bytes,
                    required_bytes = total_required,
                    path = %path.display(),
                    "Insufficient disk space"
                );
                Err(TransferError::InsufficientDiskSpace {
                    available: available_bytes,
                    required: total_required,
                })
            }
            DiskCheckBehavior::Warn => {
                warn!(
                    available_bytes = available_bytes,
                    required_bytes = total_required,
                    path = %path.display(),
                    "Insufficient disk space (warning only)"
                );
                Ok(())
            }
        }
    }
}

/// Free space on the filesystem holding `path`, matched by longest mount point
fn available_space(path: &Path) -> Option<u64> {
    let resolved = existing_ancestor(path)?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .iter()
        .filter(|disk| resolved.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    let mut current = Some(path);
    while let Some(candidate) = current {
        if let Ok(canonical) = candidate.canonicalize() {
            return Some(canonical);
        }
        current = candidate.parent();
    }
    None
}
