//! Source reader
//!
//! Turns a [`SourceLocator`] into a forward-only byte stream plus a
//! best-effort size hint. Nothing here retries; every failure goes straight
//! back to the coordinator.

use crate::request::SourceLocator;
use futures::TryStreamExt;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use vidrelay_core::{ProgressReporter, Stage, TransferConfig, TransferError, TransferResult};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

pub type ByteSource = Pin<Box<dyn AsyncRead + Send>>;

/// An opened source, ready to be read once from start to end.
pub struct OpenedSource {
    pub reader: ByteSource,
    /// Total size when the source announced it (Content-Length or file size)
    pub size_hint: Option<u64>,
}

impl std::fmt::Debug for OpenedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedSource")
            .field("size_hint", &self.size_hint)
            .finish()
    }
}

#[derive(Clone)]
pub struct SourceReader {
    client: reqwest::Client,
}

impl SourceReader {
    pub fn new(connect_timeout: Duration) -> TransferResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                TransferError::Io(std::io::Error::other(format!(
                    "failed to build HTTP client: {}",
                    e
                )))
            })?;
        Ok(Self { client })
    }

    pub fn from_config(config: &TransferConfig) -> TransferResult<Self> {
        Self::new(Duration::from_secs(config.source_connect_timeout_secs))
    }

    /// Open the source for sequential reading.
    #[tracing::instrument(skip(self), fields(source = %locator))]
    pub async fn open(&self, locator: &SourceLocator) -> TransferResult<OpenedSource> {
        match locator {
            SourceLocator::Url(url) => {
                let response = self.get(url).await?;
                let size_hint = response.content_length();
                let stream = response.bytes_stream().map_err(std::io::Error::other);
                tracing::debug!(size_hint = ?size_hint, "Remote source opened");
                Ok(OpenedSource {
                    reader: Box::pin(StreamReader::new(stream)),
                    size_hint,
                })
            }
            SourceLocator::Path(path) => {
                let (file, size) = open_file(path).await?;
                tracing::debug!(size_bytes = size, "Local source opened");
                Ok(OpenedSource {
                    reader: Box::pin(file),
                    size_hint: Some(size),
                })
            }
        }
    }

    /// Check the source can be opened without reading its body.
    ///
    /// Used when the transcoder reads the locator itself, so that an
    /// unreachable source is reported as a source failure rather than a
    /// transcoder exit.
    pub async fn probe(&self, locator: &SourceLocator) -> TransferResult<Option<u64>> {
        let opened = self.open(locator).await?;
        Ok(opened.size_hint)
    }

    async fn get(&self, url: &reqwest::Url) -> TransferResult<reqwest::Response> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            TransferError::SourceUnavailable(format!("{}: {}", url, describe_reqwest(&e)))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::SourceUnavailable(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }
        Ok(response)
    }

    /// Pump `source` into `writer` until end of stream.
    ///
    /// Read failures are `SourceInterrupted`; write failures are `Io` so the
    /// caller can tell a closed downstream apart from a broken source.
    /// Reports cumulative `Downloading` progress after every chunk.
    pub async fn copy_to<W>(
        source: OpenedSource,
        writer: &mut W,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> TransferResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let OpenedSource {
            mut reader,
            size_hint,
        } = source;
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied: u64 = 0;

        loop {
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                read = reader.read(&mut buf) => read.map_err(|e| {
                    TransferError::SourceInterrupted(format!("after {} bytes: {}", copied, e))
                })?,
            };
            if n == 0 {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                written = writer.write_all(&buf[..n]) => written?,
            }

            copied += n as u64;
            let percent = size_hint
                .filter(|total| *total > 0)
                .map(|total| copied as f64 / total as f64 * 100.0);
            progress.report(Stage::Downloading, copied, percent);
        }

        writer.flush().await?;
        Ok(copied)
    }
}

async fn open_file(path: &Path) -> TransferResult<(tokio::fs::File, u64)> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransferError::SourceNotFound(path.display().to_string()))
        }
        Err(e) => {
            return Err(TransferError::SourceUnavailable(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    };
    if !metadata.is_file() {
        return Err(TransferError::SourceUnavailable(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let file = tokio::fs::File::open(path).await.map_err(|e| {
        TransferError::SourceUnavailable(format!("{}: {}", path.display(), e))
    })?;
    Ok((file, metadata.len()))
}

fn describe_reqwest(err: &reqwest::Error) -> String {
    if err.is_connect() {
        format!("connection failed: {}", err)
    } else if err.is_timeout() {
        format!("timed out: {}", err)
    } else {
        err.to_string()
    }
}
