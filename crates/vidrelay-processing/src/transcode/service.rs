//! TranscodeService - runs `ffmpeg` remux jobs as child processes.

use super::args::{build_args, TranscodeInput, TranscodeOutput};
use super::progress::ProgressParser;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vidrelay_core::{
    ProgressReporter, Stage, TrackSelectionSpec, TransferConfig, TransferError, TransferResult,
};

/// How long to wait for stderr to drain after the child exits
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// One remux: which tracks, from where, to where.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub tracks: TrackSelectionSpec,
    pub input: TranscodeInput,
    pub output: TranscodeOutput,
}

impl TranscodeJob {
    pub fn args(&self) -> Vec<String> {
        build_args(&self.tracks, &self.input, &self.output)
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeService {
    ffmpeg_path: String,
}

impl TranscodeService {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.ffmpeg_path.clone())
    }

    /// Start the child. Stdin/stdout are piped only for `Pipe` input/output.
    ///
    /// Progress parsed from stderr is reported as `Transcoding` events.
    pub fn spawn(
        &self,
        job: &TranscodeJob,
        progress: ProgressReporter,
    ) -> TransferResult<RunningTranscode> {
        let args = job.args();
        tracing::debug!(ffmpeg = %self.ffmpeg_path, args = ?args, "Starting transcoder");

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(if job.input == TranscodeInput::Pipe {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if job.output == TranscodeOutput::Pipe {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransferError::TransformFailed {
                code: None,
                signal: None,
                detail: format!("failed to start {}: {}", self.ffmpeg_path, e),
            })?;

        let stderr = child.stderr.take().ok_or_else(|| TransferError::TransformFailed {
            code: None,
            signal: None,
            detail: "transcoder stderr was not captured".to_string(),
        })?;
        let stderr_task = tokio::spawn(watch_stderr(stderr, progress));

        Ok(RunningTranscode {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            child,
            stderr_task,
        })
    }

    /// File mode: spawn and wait for the child to finish.
    #[tracing::instrument(skip(self, job, progress, cancel))]
    pub async fn run(
        &self,
        job: &TranscodeJob,
        progress: ProgressReporter,
        cancel: &CancellationToken,
    ) -> TransferResult<()> {
        let start = std::time::Instant::now();
        let running = self.spawn(job, progress)?;
        running.wait(cancel).await?;
        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transcode completed"
        );
        Ok(())
    }
}

/// A started transcoder process.
pub struct RunningTranscode {
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    child: Child,
    stderr_task: JoinHandle<ProgressParser>,
}

impl RunningTranscode {
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Wait for exit, or kill the child when `cancel` fires.
    ///
    /// Completes exactly once: `Ok` on a zero exit status, `TransformFailed`
    /// with the exit code or signal and the tail of stderr otherwise.
    pub async fn wait(mut self, cancel: &CancellationToken) -> TransferResult<()> {
        // Our ends of the pipes must not outlive the wait
        drop(self.stdin.take());

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill transcoder");
                }
                self.stderr_task.abort();
                tracing::info!("Transcoder killed on cancellation");
                return Err(TransferError::Cancelled);
            }
            status = self.child.wait() => status.map_err(|e| TransferError::TransformFailed {
                code: None,
                signal: None,
                detail: format!("failed to wait for transcoder: {}", e),
            })?,
        };

        let detail = match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut self.stderr_task).await {
            Ok(Ok(parser)) => parser.tail(),
            Ok(Err(e)) => format!("stderr reader failed: {}", e),
            Err(_) => {
                self.stderr_task.abort();
                String::new()
            }
        };

        if status.success() {
            return Ok(());
        }

        let err = TransferError::TransformFailed {
            code: status.code(),
            signal: exit_signal(&status),
            detail,
        };
        tracing::error!(error = %err, "Transcoder failed");
        Err(err)
    }
}

async fn watch_stderr(stderr: ChildStderr, progress: ProgressReporter) -> ProgressParser {
    let mut parser = ProgressParser::new();
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();

    // Stderr carries raw metadata tags and file names, so lines may not be
    // UTF-8. The pipe must be drained to EOF or the child dies on SIGPIPE.
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Some(update) = parser.feed_line(&line) {
                    progress.report(Stage::Transcoding, update.total_size, update.percent);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Transcoder stderr read failed, draining");
                if drain(&mut reader).await {
                    break;
                }
            }
        }
    }
    parser
}

/// Discard whatever is buffered after a read error. Returns true at EOF.
async fn drain(reader: &mut BufReader<ChildStderr>) -> bool {
    let mut sink = [0u8; 4096];
    match reader.read(&mut sink).await {
        Ok(0) | Err(_) => true,
        Ok(_) => false,
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_transform_failure() {
        let service = TranscodeService::new("/nonexistent/ffmpeg-binary");
        let job = TranscodeJob {
            tracks: TrackSelectionSpec::default(),
            input: TranscodeInput::Pipe,
            output: TranscodeOutput::Pipe,
        };
        let err = service
            .spawn(&job, ProgressReporter::disabled())
            .err()
            .unwrap();
        match err {
            TransferError::TransformFailed { code, signal, detail } => {
                assert_eq!(code, None);
                assert_eq!(signal, None);
                assert!(detail.contains("failed to start"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_stderr_does_not_fail_transcode() {
        use std::os::unix::fs::PermissionsExt;
        use tokio::sync::mpsc;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ffmpeg.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             printf '  Metadata:\\n    title : Caf\\351\\n' >&2\n\
             echo '  Duration: 00:00:04.00, start: 0.000000, bitrate: 1 kb/s' >&2\n\
             sleep 0.3\n\
             i=0\n\
             while [ $i -lt 200 ]; do\n\
               echo \"total_size=$i\" >&2\n\
               echo 'progress=continue' >&2\n\
               i=$((i+1))\n\
             done\n\
             echo 'progress=end' >&2\n\
             exit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let service = TranscodeService::new(script.display().to_string());
        let job = TranscodeJob {
            tracks: TrackSelectionSpec::default(),
            input: TranscodeInput::Path(dir.path().join("in.mp4")),
            output: TranscodeOutput::Path(dir.path().join("out.mp4")),
        };
        service
            .run(&job, ProgressReporter::new(tx), &CancellationToken::new())
            .await
            .unwrap();

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        let last = last.expect("no progress reported");
        assert_eq!(last.stage, Stage::Transcoding);
        assert_eq!(last.percent, Some(100.0));
    }
}
