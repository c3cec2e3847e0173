use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vidrelay_core::TransferResult;

const INPUT_FILE: &str = "input";
const OUTPUT_FILE: &str = "output.mp4";

/// Scratch directory owned by a single run.
///
/// Every on-disk artifact of the run lives inside it. The directory is
/// removed by [`close`](Self::close), or on drop if the run is abandoned.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    pub fn create(parent: &Path) -> TransferResult<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix("vidrelay-")
            .tempdir_in(parent)?;
        tracing::debug!(path = %dir.path().display(), "Run workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Downloaded source media (download topology only)
    pub fn input_path(&self) -> PathBuf {
        self.dir.path().join(INPUT_FILE)
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_FILE)
    }

    /// Delete the directory and everything in it.
    pub fn close(self) -> TransferResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        tracing::debug!(path = %path.display(), "Run workspace removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_removes_artifacts() {
        let parent = tempfile::tempdir().unwrap();
        let workspace = RunWorkspace::create(&parent.path().join("scratch")).unwrap();
        std::fs::write(workspace.input_path(), b"in").unwrap();
        std::fs::write(workspace.output_path(), b"out").unwrap();
        let path = workspace.path().to_path_buf();

        workspace.close().unwrap();
        assert!(!path.exists());
        assert_eq!(
            std::fs::read_dir(parent.path().join("scratch")).unwrap().count(),
            0
        );
    }

    #[test]
    fn test_workspaces_are_unique() {
        let parent = tempfile::tempdir().unwrap();
        let a = RunWorkspace::create(parent.path()).unwrap();
        let b = RunWorkspace::create(parent.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
