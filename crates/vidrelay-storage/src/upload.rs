//! Multipart uploader
//!
//! Reads a byte stream in fixed-size parts and uploads them with bounded
//! parallelism. Uploading is split into two phases: [`MultipartUploader::stage`]
//! pushes every part, and [`StagedUpload::commit`] makes the object visible.
//! The pipeline only commits once every other stage of the run has succeeded.

use crate::traits::{ObjectStorage, StorageResult, UploadedPart};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vidrelay_core::{ProgressReporter, Stage, TransferConfig, TransferError, TransferResult};

const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Most parts one S3 multipart upload may have. With the default 10 MiB
/// parts this caps an object at about 100 GiB.
const MAX_PARTS: i32 = 10_000;

/// Result of a committed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: String,
    pub upload_id: String,
    pub part_count: usize,
    pub total_bytes: u64,
}

pub struct MultipartUploader {
    storage: Arc<dyn ObjectStorage>,
    part_size: usize,
    concurrency: usize,
    max_parts: i32,
    content_type: String,
}

impl MultipartUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, part_size: usize, concurrency: usize) -> Self {
        Self {
            storage,
            part_size: part_size.max(1),
            concurrency: concurrency.max(1),
            max_parts: MAX_PARTS,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    pub fn from_config(storage: Arc<dyn ObjectStorage>, config: &TransferConfig) -> Self {
        Self::new(storage, config.part_size_bytes, config.upload_concurrency)
            .with_content_type(config.content_type.clone())
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Lower the part limit, for stores stricter than S3.
    pub fn with_max_parts(mut self, max_parts: i32) -> Self {
        self.max_parts = max_parts.clamp(1, MAX_PARTS);
        self
    }

    /// Upload and commit in one step.
    pub async fn upload<R>(
        &self,
        key: &str,
        reader: R,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> TransferResult<UploadReceipt>
    where
        R: AsyncRead + Unpin + Send,
    {
        let staged = self.stage(key, reader, progress, cancel).await?;
        staged.commit().await
    }

    /// Upload every part read from `reader` without completing the upload.
    ///
    /// On error or cancellation the multipart upload is aborted before
    /// returning. At most `concurrency` parts are in flight, so memory stays
    /// bounded by `(concurrency + 1) * part_size`.
    #[tracing::instrument(skip(self, reader, progress, cancel), fields(key = %key))]
    pub async fn stage<R>(
        &self,
        key: &str,
        mut reader: R,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> TransferResult<StagedUpload>
    where
        R: AsyncRead + Unpin + Send,
    {
        let upload_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            created = self.storage.create_multipart(key, &self.content_type) => created?,
        };

        let mut staged = StagedUpload {
            storage: Arc::clone(&self.storage),
            key: key.to_string(),
            upload_id,
            parts: Vec::new(),
            started: Instant::now(),
            finished: false,
        };

        let outcome = self
            .push_parts(&mut staged, &mut reader, progress, cancel)
            .await;

        match outcome {
            Ok(()) => {
                staged.parts.sort_by_key(|p| p.part_number);
                tracing::debug!(
                    key = %staged.key,
                    parts = staged.parts.len(),
                    size_bytes = staged.total_bytes(),
                    "All parts staged"
                );
                Ok(staged)
            }
            Err(e) => {
                staged.abort().await;
                Err(e)
            }
        }
    }

    async fn push_parts<R>(
        &self,
        staged: &mut StagedUpload,
        reader: &mut R,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> TransferResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut in_flight: JoinSet<StorageResult<UploadedPart>> = JoinSet::new();
        let result = self
            .fill_parts(staged, reader, progress, cancel, &mut in_flight)
            .await;
        if result.is_err() {
            // No part may land after the upload is aborted
            in_flight.shutdown().await;
        }
        result
    }

    async fn fill_parts<R>(
        &self,
        staged: &mut StagedUpload,
        reader: &mut R,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
        in_flight: &mut JoinSet<StorageResult<UploadedPart>>,
    ) -> TransferResult<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut uploaded_bytes: u64 = 0;
        let mut part_number: i32 = 1;

        loop {
            while in_flight.len() >= self.concurrency {
                let part = Self::join_next(in_flight, cancel).await?;
                uploaded_bytes += part.size_bytes;
                progress.report(Stage::Uploading, uploaded_bytes, None);
                staged.parts.push(part);
            }

            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                chunk = read_part(reader, self.part_size) => chunk.map_err(|e| {
                    TransferError::SinkInterrupted(format!("Failed to read upload input: {}", e))
                })?,
            };

            let at_eof = chunk.len() < self.part_size;
            // An empty stream still yields one (empty) part so the object exists
            if chunk.is_empty() && part_number > 1 {
                break;
            }
            if part_number > self.max_parts {
                return Err(TransferError::SinkRejected(format!(
                    "object exceeds {} parts of {} bytes",
                    self.max_parts, self.part_size
                )));
            }

            let storage = Arc::clone(&staged.storage);
            let key = staged.key.clone();
            let upload_id = staged.upload_id.clone();
            let number = part_number;
            in_flight.spawn(async move {
                storage
                    .upload_part(&key, &upload_id, number, Bytes::from(chunk))
                    .await
            });
            part_number += 1;

            if at_eof {
                break;
            }
        }

        while !in_flight.is_empty() {
            let part = Self::join_next(in_flight, cancel).await?;
            uploaded_bytes += part.size_bytes;
            progress.report(Stage::Uploading, uploaded_bytes, None);
            staged.parts.push(part);
        }

        Ok(())
    }

    async fn join_next(
        in_flight: &mut JoinSet<StorageResult<UploadedPart>>,
        cancel: &CancellationToken,
    ) -> TransferResult<UploadedPart> {
        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            joined = in_flight.join_next() => joined,
        };
        match joined {
            Some(Ok(Ok(part))) => Ok(part),
            Some(Ok(Err(e))) => Err(e.into()),
            Some(Err(e)) => Err(TransferError::SinkInterrupted(format!(
                "Part upload task failed: {}",
                e
            ))),
            None => Err(TransferError::SinkInterrupted(
                "No part upload in flight".to_string(),
            )),
        }
    }
}

/// Read up to `part_size` bytes, stopping early only at end of stream
async fn read_part<R>(reader: &mut R, part_size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(part_size);
    let mut limited = reader.take(part_size as u64);
    limited.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Every part of an upload has been accepted; the object is not visible yet.
///
/// Dropping a `StagedUpload` without calling [`commit`](Self::commit) or
/// [`abort`](Self::abort) schedules an abort on the current runtime.
pub struct StagedUpload {
    storage: Arc<dyn ObjectStorage>,
    key: String,
    upload_id: String,
    parts: Vec<UploadedPart>,
    started: Instant,
    finished: bool,
}

impl StagedUpload {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Sum of the sizes of every staged part
    pub fn total_bytes(&self) -> u64 {
        self.parts.iter().map(|p| p.size_bytes).sum()
    }

    /// Complete the upload. On failure the upload is aborted.
    pub async fn commit(mut self) -> TransferResult<UploadReceipt> {
        let receipt = UploadReceipt {
            key: self.key.clone(),
            upload_id: self.upload_id.clone(),
            part_count: self.parts.len(),
            total_bytes: self.total_bytes(),
        };

        let parts = std::mem::take(&mut self.parts);
        match self
            .storage
            .complete_multipart(&self.key, &self.upload_id, parts)
            .await
        {
            Ok(()) => {
                self.finished = true;
                tracing::info!(
                    key = %receipt.key,
                    parts = receipt.part_count,
                    size_bytes = receipt.total_bytes,
                    duration_ms = self.started.elapsed().as_secs_f64() * 1000.0,
                    "Upload committed"
                );
                Ok(receipt)
            }
            Err(e) => {
                self.abort().await;
                Err(e.into())
            }
        }
    }

    /// Discard every staged part. Failures are logged, never returned, so
    /// they cannot mask the error that caused the abort.
    pub async fn abort(mut self) {
        self.finished = true;
        if let Err(e) = self
            .storage
            .abort_multipart(&self.key, &self.upload_id)
            .await
        {
            tracing::warn!(
                error = %e,
                key = %self.key,
                upload_id = %self.upload_id,
                "Failed to abort multipart upload"
            );
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                key = %self.key,
                upload_id = %self.upload_id,
                "Staged upload dropped outside a runtime; parts left on the backend"
            );
            return;
        };
        let storage = Arc::clone(&self.storage);
        let key = std::mem::take(&mut self.key);
        let upload_id = std::mem::take(&mut self.upload_id);
        handle.spawn(async move {
            if let Err(e) = storage.abort_multipart(&key, &upload_id).await {
                tracing::warn!(error = %e, key = %key, upload_id = %upload_id, "Failed to abort dropped upload");
            }
        });
    }
}

impl std::fmt::Debug for StagedUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedUpload")
            .field("key", &self.key)
            .field("upload_id", &self.upload_id)
            .field("parts", &self.parts.len())
            .finish()
    }
}
