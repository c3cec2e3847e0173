//! Transfer coordinator
//!
//! Drives one request through the state machine
//! `Idle → Fetching → Transforming → Uploading → Done` (or `Failed`) using the
//! configured topology. The upload is staged first and only committed once
//! every other stage has succeeded and the run's scratch workspace is gone,
//! so neither a truncated object nor a leftover artifact can outlive a run.

use super::workspace::RunWorkspace;
use crate::request::{SourceLocator, TransferRequest};
use crate::source::{OpenedSource, SourceReader};
use crate::transcode::{TranscodeInput, TranscodeJob, TranscodeOutput, TranscodeService};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::ChildStdin;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;
use vidrelay_core::{
    ProgressReporter, RunState, Topology, TransferConfig, TransferError, TransferResult,
};
use vidrelay_infra::CapacityChecker;
use vidrelay_storage::{MultipartUploader, ObjectStorage, StagedUpload, UploadReceipt};

/// Final confirmation of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub run_id: Uuid,
    pub destination_key: String,
    pub bytes_uploaded: u64,
    pub parts: usize,
    pub topology: Topology,
    pub duration_ms: u64,
}

/// Logs every state change of one run
struct RunTracker {
    state: RunState,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
        }
    }

    fn advance(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "Ignoring invalid run state transition");
            return;
        }
        tracing::info!(from = %self.state, to = %next, "Run state changed");
        self.state = next;
    }
}

pub struct Coordinator {
    topology: Topology,
    temp_dir: PathBuf,
    timeout: Option<Duration>,
    source: SourceReader,
    transcoder: TranscodeService,
    uploader: MultipartUploader,
    capacity: CapacityChecker,
}

impl Coordinator {
    /// Build a coordinator from explicit configuration and a storage handle.
    ///
    /// Nothing is read from the environment; several coordinators with
    /// different settings can run side by side.
    pub fn new(config: &TransferConfig, storage: Arc<dyn ObjectStorage>) -> TransferResult<Self> {
        config
            .validate()
            .map_err(|e| TransferError::InvalidRequest(format!("invalid configuration: {}", e)))?;

        Ok(Self {
            topology: config.topology,
            temp_dir: config.temp_dir.clone(),
            timeout: (config.transfer_timeout_secs > 0)
                .then(|| Duration::from_secs(config.transfer_timeout_secs)),
            source: SourceReader::from_config(config)?,
            transcoder: TranscodeService::from_config(config),
            uploader: MultipartUploader::from_config(storage, config),
            capacity: CapacityChecker::new(config),
        })
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Run one transfer to completion.
    ///
    /// Cancelling `cancel` kills the transcoder, aborts the upload and
    /// removes the workspace before `Cancelled` is returned. Progress events
    /// go to `progress` and never affect the outcome.
    pub async fn run(
        &self,
        request: &TransferRequest,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> TransferResult<TransferOutcome> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "transfer",
            run_id = %run_id,
            key = %request.destination_key,
            topology = %self.topology
        );
        self.run_inner(run_id, request, progress, cancel)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        request: &TransferRequest,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> TransferResult<TransferOutcome> {
        let start = Instant::now();
        let mut tracker = RunTracker::new();
        tracing::info!(source = %request.source, "Transfer started");

        let result = match request.validate() {
            Err(e) => Err(e),
            Ok(()) => {
                let run_token = cancel.child_token();
                match self
                    .execute_with_timeout(request, progress, &run_token, &mut tracker)
                    .await
                {
                    // Stage errors caused by the cancellation itself are not the cause
                    Err(e) if run_token.is_cancelled() && !matches!(e, TransferError::Cancelled) => {
                        tracing::debug!(error = %e, "Stage error superseded by cancellation");
                        Err(TransferError::Cancelled)
                    }
                    other => other,
                }
            }
        };

        match result {
            Ok(receipt) => {
                tracker.advance(RunState::Done);
                let outcome = TransferOutcome {
                    run_id,
                    destination_key: receipt.key,
                    bytes_uploaded: receipt.total_bytes,
                    parts: receipt.part_count,
                    topology: self.topology,
                    duration_ms: start.elapsed().as_millis() as u64,
                };
                tracing::info!(
                    bytes_uploaded = outcome.bytes_uploaded,
                    parts = outcome.parts,
                    duration_ms = outcome.duration_ms,
                    "Transfer completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                tracker.advance(RunState::Failed);
                tracing::error!(
                    error = %e,
                    error_code = e.error_code(),
                    component = %e.component(),
                    retriable = e.is_retriable(),
                    "Transfer failed"
                );
                Err(e)
            }
        }
    }

    async fn execute_with_timeout(
        &self,
        request: &TransferRequest,
        progress: &ProgressReporter,
        run_token: &CancellationToken,
        tracker: &mut RunTracker,
    ) -> TransferResult<UploadReceipt> {
        let execution = self.execute(request, progress, run_token, tracker);
        let Some(limit) = self.timeout else {
            return execution.await;
        };

        tokio::pin!(execution);
        tokio::select! {
            result = &mut execution => result,
            _ = tokio::time::sleep(limit) => {
                tracing::warn!(timeout_secs = limit.as_secs(), "Transfer timed out, cancelling");
                run_token.cancel();
                execution.await
            }
        }
    }

    async fn execute(
        &self,
        request: &TransferRequest,
        progress: &ProgressReporter,
        run_token: &CancellationToken,
        tracker: &mut RunTracker,
    ) -> TransferResult<UploadReceipt> {
        let staged = match self.topology {
            Topology::StreamToStream => {
                self.stream_to_stream(request, progress, run_token, tracker)
                    .await?
            }
            Topology::RemoteReadToFile => {
                self.remote_read_to_file(request, progress, run_token, tracker)
                    .await?
            }
            Topology::DownloadTransformUpload => {
                self.download_transform_upload(request, progress, run_token, tracker)
                    .await?
            }
        };

        if run_token.is_cancelled() {
            staged.abort().await;
            return Err(TransferError::Cancelled);
        }
        staged.commit().await
    }

    /// Source → transcoder stdin, transcoder stdout → uploader, all at once.
    async fn stream_to_stream(
        &self,
        request: &TransferRequest,
        progress: &ProgressReporter,
        run_token: &CancellationToken,
        tracker: &mut RunTracker,
    ) -> TransferResult<StagedUpload> {
        tracker.advance(RunState::Fetching);
        let opened = self.open_source(&request.source, run_token).await?;

        tracker.advance(RunState::Transforming);
        let job = TranscodeJob {
            tracks: request.tracks.clone(),
            input: TranscodeInput::Pipe,
            output: TranscodeOutput::Pipe,
        };
        let mut running = self.transcoder.spawn(&job, progress.clone())?;
        let (Some(stdin), Some(stdout)) = (running.take_stdin(), running.take_stdout()) else {
            return Err(TransferError::TransformFailed {
                code: None,
                signal: None,
                detail: "transcoder pipes were not captured".to_string(),
            });
        };

        tracker.advance(RunState::Uploading);
        // Cancelled when any stage fails so the others stop promptly
        let stages = run_token.child_token();

        let feed = async {
            let result = feed_transcoder(opened, stdin, progress, &stages).await;
            if result.is_err() {
                stages.cancel();
            }
            result
        };
        let transcode = async {
            let result = running.wait(&stages).await;
            if result.is_err() {
                stages.cancel();
            }
            result
        };
        let upload = async {
            let result = self
                .uploader
                .stage(&request.destination_key, stdout, progress, &stages)
                .await;
            if result.is_err() {
                stages.cancel();
            }
            result
        };

        let (fed, transcoded, staged) = tokio::join!(feed, transcode, upload);

        let mut errors = Vec::new();
        if let Err(e) = fed {
            errors.push(e);
        }
        if let Err(e) = transcoded {
            errors.push(e);
        }
        let staged = match staged {
            Ok(staged) => Some(staged),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        match staged {
            Some(staged) if errors.is_empty() => Ok(staged),
            staged => {
                // Output may be truncated; it must never be committed
                if let Some(staged) = staged {
                    staged.abort().await;
                }
                Err(originating_error(errors, run_token.is_cancelled()))
            }
        }
    }

    /// Transcoder reads the locator itself and writes the workspace output.
    async fn remote_read_to_file(
        &self,
        request: &TransferRequest,
        progress: &ProgressReporter,
        run_token: &CancellationToken,
        tracker: &mut RunTracker,
    ) -> TransferResult<StagedUpload> {
        tracker.advance(RunState::Fetching);
        let size_hint = tokio::select! {
            biased;
            _ = run_token.cancelled() => return Err(TransferError::Cancelled),
            probed = self.source.probe(&request.source) => probed?,
        };
        self.ensure_capacity(size_hint).await?;

        let workspace = RunWorkspace::create(&self.temp_dir)?;
        let input = match &request.source {
            SourceLocator::Url(url) => TranscodeInput::Url(url.to_string()),
            SourceLocator::Path(path) => TranscodeInput::Path(path.clone()),
        };
        let staged = self
            .transcode_and_stage(request, input, &workspace, progress, run_token, tracker)
            .await;
        release_workspace(workspace, staged).await
    }

    /// Source downloaded into the workspace, transcoded file to file.
    async fn download_transform_upload(
        &self,
        request: &TransferRequest,
        progress: &ProgressReporter,
        run_token: &CancellationToken,
        tracker: &mut RunTracker,
    ) -> TransferResult<StagedUpload> {
        tracker.advance(RunState::Fetching);
        let opened = self.open_source(&request.source, run_token).await?;
        self.ensure_capacity(opened.size_hint).await?;

        let workspace = RunWorkspace::create(&self.temp_dir)?;
        let staged = self
            .download_and_stage(request, opened, &workspace, progress, run_token, tracker)
            .await;
        release_workspace(workspace, staged).await
    }

    async fn download_and_stage(
        &self,
        request: &TransferRequest,
        opened: OpenedSource,
        workspace: &RunWorkspace,
        progress: &ProgressReporter,
        run_token: &CancellationToken,
        tracker: &mut RunTracker,
    ) -> TransferResult<StagedUpload> {
        let input_path = workspace.input_path();
        let mut input = tokio::fs::File::create(&input_path).await?;
        let downloaded = SourceReader::copy_to(opened, &mut input, progress, run_token).await?;
        input.sync_all().await?;
        drop(input);
        tracing::info!(size_bytes = downloaded, "Source downloaded");

        self.transcode_and_stage(
            request,
            TranscodeInput::Path(input_path),
            workspace,
            progress,
            run_token,
            tracker,
        )
        .await
    }

    async fn transcode_and_stage(
        &self,
        request: &TransferRequest,
        input: TranscodeInput,
        workspace: &RunWorkspace,
        progress: &ProgressReporter,
        run_token: &CancellationToken,
        tracker: &mut RunTracker,
    ) -> TransferResult<StagedUpload> {
        tracker.advance(RunState::Transforming);
        let output_path = workspace.output_path();
        let job = TranscodeJob {
            tracks: request.tracks.clone(),
            input,
            output: TranscodeOutput::Path(output_path.clone()),
        };
        self.transcoder
            .run(&job, progress.clone(), run_token)
            .await?;

        // Only the output artifact may remain while uploading
        if let TranscodeInput::Path(input_path) = &job.input {
            if input_path.starts_with(workspace.path()) {
                tokio::fs::remove_file(input_path).await?;
            }
        }

        tracker.advance(RunState::Uploading);
        self.stage_file(&request.destination_key, &output_path, progress, run_token)
            .await
    }

    async fn stage_file(
        &self,
        key: &str,
        path: &Path,
        progress: &ProgressReporter,
        run_token: &CancellationToken,
    ) -> TransferResult<StagedUpload> {
        let file = tokio::fs::File::open(path).await?;
        self.uploader.stage(key, file, progress, run_token).await
    }

    async fn open_source(
        &self,
        locator: &SourceLocator,
        cancel: &CancellationToken,
    ) -> TransferResult<OpenedSource> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            opened = self.source.open(locator) => opened,
        }
    }

    async fn ensure_capacity(&self, size_hint: Option<u64>) -> TransferResult<()> {
        let required = self
            .capacity
            .estimate_artifact_bytes(self.topology, size_hint);
        tracing::debug!(
            size_hint = ?size_hint,
            required_bytes = required,
            "Checking scratch disk capacity"
        );
        self.capacity
            .check_disk_space_async(&self.temp_dir, required)
            .await
    }
}

/// Copy the source into the transcoder's stdin, closing it at end of input.
///
/// A write failure means the transcoder stopped reading; its exit status is
/// what decides the run, so that is not reported here.
async fn feed_transcoder(
    source: OpenedSource,
    mut stdin: ChildStdin,
    progress: &ProgressReporter,
    cancel: &CancellationToken,
) -> TransferResult<()> {
    match SourceReader::copy_to(source, &mut stdin, progress, cancel).await {
        Ok(bytes) => {
            tracing::debug!(size_bytes = bytes, "Source fully fed to transcoder");
            Ok(())
        }
        Err(TransferError::Io(e)) => {
            tracing::debug!(error = %e, "Transcoder closed its input early");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Remove the workspace, then hand back the staged upload.
///
/// A cleanup failure on an otherwise successful run aborts the upload: the
/// run cannot report success while an artifact remains.
async fn release_workspace(
    workspace: RunWorkspace,
    staged: TransferResult<StagedUpload>,
) -> TransferResult<StagedUpload> {
    match (staged, workspace.close()) {
        (Ok(staged), Ok(())) => Ok(staged),
        (Ok(staged), Err(e)) => {
            staged.abort().await;
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            tracing::warn!(error = %cleanup, "Failed to remove run workspace");
            Err(e)
        }
    }
}

/// Pick the error that caused a multi-stage failure.
///
/// External cancellation wins; otherwise upstream beats downstream.
/// Cancellations a stage saw only because a sibling failed are dropped.
fn originating_error(errors: Vec<TransferError>, externally_cancelled: bool) -> TransferError {
    if externally_cancelled {
        return TransferError::Cancelled;
    }
    errors
        .into_iter()
        .filter(|e| !matches!(e, TransferError::Cancelled))
        .min_by_key(|e| e.origin_rank())
        .unwrap_or(TransferError::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform_failed() -> TransferError {
        TransferError::TransformFailed {
            code: Some(1),
            signal: None,
            detail: String::new(),
        }
    }

    #[test]
    fn test_source_error_beats_downstream_failures() {
        let err = originating_error(
            vec![
                TransferError::SinkInterrupted("reset".into()),
                transform_failed(),
                TransferError::SourceInterrupted("eof".into()),
            ],
            false,
        );
        assert!(matches!(err, TransferError::SourceInterrupted(_)));
    }

    #[test]
    fn test_sibling_cancellations_are_ignored() {
        let err = originating_error(
            vec![TransferError::Cancelled, TransferError::SinkRejected("403".into())],
            false,
        );
        assert!(matches!(err, TransferError::SinkRejected(_)));
    }

    #[test]
    fn test_external_cancellation_wins() {
        let err = originating_error(vec![transform_failed()], true);
        assert!(matches!(err, TransferError::Cancelled));
    }

    #[test]
    fn test_run_tracker_rejects_backwards_moves() {
        let mut tracker = RunTracker::new();
        tracker.advance(RunState::Transforming);
        tracker.advance(RunState::Fetching);
        assert_eq!(tracker.state, RunState::Transforming);
        tracker.advance(RunState::Failed);
        tracker.advance(RunState::Done);
        assert_eq!(tracker.state, RunState::Failed);
    }
}
