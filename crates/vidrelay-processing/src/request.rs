use reqwest::Url;
use std::fmt;
use std::path::PathBuf;
use vidrelay_core::{TrackSelectionSpec, TransferError, TransferResult};

/// Where the source media lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Url(Url),
    Path(PathBuf),
}

impl SourceLocator {
    /// `http(s)://` arguments are URLs, anything without a scheme is a path.
    pub fn parse(raw: &str) -> TransferResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TransferError::InvalidRequest(
                "source locator is empty".to_string(),
            ));
        }

        if raw.contains("://") {
            let url = Url::parse(raw)
                .map_err(|e| TransferError::InvalidRequest(format!("invalid URL {}: {}", raw, e)))?;
            return match url.scheme() {
                "http" | "https" => Ok(SourceLocator::Url(url)),
                other => Err(TransferError::InvalidRequest(format!(
                    "unsupported URL scheme: {}",
                    other
                ))),
            };
        }

        Ok(SourceLocator::Path(PathBuf::from(raw)))
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Url(url) => write!(f, "{}", url),
            SourceLocator::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One transfer: where to read, where to write, which tracks to keep.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source: SourceLocator,
    /// Used verbatim; no extension is added or checked
    pub destination_key: String,
    pub tracks: TrackSelectionSpec,
}

impl TransferRequest {
    pub fn new(
        source: SourceLocator,
        destination_key: impl Into<String>,
        tracks: TrackSelectionSpec,
    ) -> TransferResult<Self> {
        let request = Self {
            source,
            destination_key: destination_key.into(),
            tracks,
        };
        request.validate()?;
        Ok(request)
    }

    /// Parse a raw source argument and build a request in one step.
    pub fn parse(
        source: &str,
        destination_key: impl Into<String>,
        tracks: TrackSelectionSpec,
    ) -> TransferResult<Self> {
        Self::new(SourceLocator::parse(source)?, destination_key, tracks)
    }

    pub fn validate(&self) -> TransferResult<()> {
        vidrelay_storage::validate_key(&self.destination_key)
            .map_err(|e| TransferError::InvalidRequest(e.to_string()))?;
        self.tracks.validate().map_err(TransferError::InvalidRequest)?;
        Ok(())
    }
}
