//! Configuration module
//!
//! Everything a transfer run needs from its environment: object-storage
//! credentials, the transcoder binary, upload tuning and scratch-disk policy.
//! The config is built once and handed to the pipeline explicitly; nothing
//! reads the environment after startup.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::Topology;
use crate::storage_types::StorageBackend;

// Common constants
const REGION: &str = "auto";
const UPLOAD_PART_SIZE_MB: usize = 10;
const UPLOAD_CONCURRENCY: usize = 4;
const MAX_UPLOAD_CONCURRENCY: usize = 16;
const SOURCE_CONNECT_TIMEOUT_SECS: u64 = 30;
const MIN_DISK_FREE_GB: u64 = 1;
const TRANSCODE_SPACE_MULTIPLIER: f64 = 2.0;
const DEFAULT_SOURCE_SIZE_MB: u64 = 1024;
const LIST_PAGE_SIZE: i32 = 1000;
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Smallest part S3-compatible stores accept (except for the last part)
pub const MIN_PART_SIZE_BYTES: usize = 5 * 1024 * 1024;
/// Largest part S3-compatible stores accept
pub const MAX_PART_SIZE_BYTES: usize = 5 * 1024 * 1024 * 1024;

/// Connection settings for an S3-compatible endpoint (Cloudflare R2, MinIO, AWS).
#[derive(Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub region: String,
    pub force_path_style: bool,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

/// What to do when the scratch directory looks too small for a file topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskCheckBehavior {
    Fail,
    Warn,
}

impl FromStr for DiskCheckBehavior {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(DiskCheckBehavior::Fail),
            "warn" => Ok(DiskCheckBehavior::Warn),
            _ => Err(anyhow::anyhow!(
                "DISK_CHECK_BEHAVIOR must be 'fail' or 'warn', got {}",
                s
            )),
        }
    }
}

/// Transfer configuration
#[derive(Clone, Debug)]
pub struct TransferConfig {
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub s3: Option<S3Settings>,
    pub local_storage_path: Option<PathBuf>,
    pub list_page_size: i32,
    // Pipeline configuration
    pub ffmpeg_path: String,
    pub topology: Topology,
    pub part_size_bytes: usize,
    pub upload_concurrency: usize,
    pub content_type: String,
    pub temp_dir: PathBuf,
    pub source_connect_timeout_secs: u64,
    /// Whole-run timeout in seconds. 0 = disabled.
    pub transfer_timeout_secs: u64,
    // Capacity check configuration
    pub min_disk_free_gb: u64,
    pub disk_check_behavior: DiskCheckBehavior,
    pub transcode_space_multiplier: f64,
    pub default_source_size_bytes: u64,
}

impl TransferConfig {
    /// Load configuration from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StorageBackend::S3,
        };

        let s3 = match storage_backend {
            StorageBackend::S3 => Some(S3Settings {
                endpoint: var("R2_ENDPOINT")
                    .or_else(|| var("R2_API_ENDPOINT"))
                    .ok_or_else(|| anyhow::anyhow!("R2_ENDPOINT must be set for S3 storage"))?,
                access_key_id: var("R2_ACCESS_KEY_ID")
                    .ok_or_else(|| anyhow::anyhow!("R2_ACCESS_KEY_ID must be set"))?,
                secret_access_key: var("R2_SECRET_ACCESS_KEY")
                    .ok_or_else(|| anyhow::anyhow!("R2_SECRET_ACCESS_KEY must be set"))?,
                bucket: var("R2_BUCKET_NAME")
                    .ok_or_else(|| anyhow::anyhow!("R2_BUCKET_NAME must be set"))?,
                region: var("R2_REGION").unwrap_or_else(|| REGION.to_string()),
                force_path_style: var("R2_FORCE_PATH_STYLE")
                    .map(|v| v.to_lowercase().parse().unwrap_or(true))
                    .unwrap_or(true),
            }),
            StorageBackend::Local => None,
        };

        let topology = match var("TRANSFER_TOPOLOGY") {
            Some(raw) => raw.parse()?,
            None => Topology::StreamToStream,
        };

        let disk_check_behavior = match var("DISK_CHECK_BEHAVIOR") {
            Some(raw) => raw.parse()?,
            None => DiskCheckBehavior::Fail,
        };

        let config = TransferConfig {
            storage_backend,
            s3,
            local_storage_path: var("LOCAL_STORAGE_PATH").map(PathBuf::from),
            list_page_size: var("LIST_PAGE_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(LIST_PAGE_SIZE),
            ffmpeg_path: var("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            topology,
            part_size_bytes: var("UPLOAD_PART_SIZE_MB")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(UPLOAD_PART_SIZE_MB)
                .checked_mul(BYTES_PER_MB as usize)
                .ok_or_else(|| anyhow::anyhow!("UPLOAD_PART_SIZE_MB is too large"))?,
            upload_concurrency: var("UPLOAD_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(UPLOAD_CONCURRENCY),
            content_type: var("UPLOAD_CONTENT_TYPE").unwrap_or_else(|| "video/mp4".to_string()),
            temp_dir: var("TRANSFER_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            source_connect_timeout_secs: var("SOURCE_CONNECT_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(SOURCE_CONNECT_TIMEOUT_SECS),
            transfer_timeout_secs: var("TRANSFER_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            min_disk_free_gb: var("MIN_DISK_FREE_GB")
                .and_then(|v| v.parse().ok())
                .unwrap_or(MIN_DISK_FREE_GB),
            disk_check_behavior,
            transcode_space_multiplier: var("TRANSCODE_SPACE_MULTIPLIER")
                .and_then(|v| v.parse().ok())
                .unwrap_or(TRANSCODE_SPACE_MULTIPLIER),
            default_source_size_bytes: var("DEFAULT_SOURCE_SIZE_MB")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_SOURCE_SIZE_MB)
                .checked_mul(BYTES_PER_MB)
                .ok_or_else(|| anyhow::anyhow!("DEFAULT_SOURCE_SIZE_MB is too large"))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration for a local-filesystem bucket rooted at `path`, with
    /// defaults for everything else. Useful for offline runs and tests.
    pub fn for_local_storage(path: impl Into<PathBuf>) -> Self {
        TransferConfig {
            storage_backend: StorageBackend::Local,
            s3: None,
            local_storage_path: Some(path.into()),
            list_page_size: LIST_PAGE_SIZE,
            ffmpeg_path: "ffmpeg".to_string(),
            topology: Topology::StreamToStream,
            part_size_bytes: UPLOAD_PART_SIZE_MB * 1024 * 1024,
            upload_concurrency: UPLOAD_CONCURRENCY,
            content_type: "video/mp4".to_string(),
            temp_dir: env::temp_dir(),
            source_connect_timeout_secs: SOURCE_CONNECT_TIMEOUT_SECS,
            transfer_timeout_secs: 0,
            min_disk_free_gb: 0,
            disk_check_behavior: DiskCheckBehavior::Warn,
            transcode_space_multiplier: TRANSCODE_SPACE_MULTIPLIER,
            default_source_size_bytes: DEFAULT_SOURCE_SIZE_MB * 1024 * 1024,
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.upload_concurrency == 0 || self.upload_concurrency > MAX_UPLOAD_CONCURRENCY {
            return Err(anyhow::anyhow!(
                "UPLOAD_CONCURRENCY must be between 1 and {}",
                MAX_UPLOAD_CONCURRENCY
            ));
        }

        if self.part_size_bytes == 0 || self.part_size_bytes > MAX_PART_SIZE_BYTES {
            return Err(anyhow::anyhow!(
                "UPLOAD_PART_SIZE_MB must be between 5 and 5120"
            ));
        }

        if self.list_page_size <= 0 {
            return Err(anyhow::anyhow!("LIST_PAGE_SIZE must be positive"));
        }

        if self.transcode_space_multiplier.is_nan() || self.transcode_space_multiplier <= 0.0 {
            return Err(anyhow::anyhow!(
                "TRANSCODE_SPACE_MULTIPLIER must be a positive number"
            ));
        }

        // Validate storage backend configuration
        match self.storage_backend {
            StorageBackend::S3 => {
                let s3 = self.s3.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("S3 settings must be present when using S3 storage backend")
                })?;
                if !s3.endpoint.starts_with("http://") && !s3.endpoint.starts_with("https://") {
                    return Err(anyhow::anyhow!(
                        "R2_ENDPOINT must be an http(s) URL, got {}",
                        s3.endpoint
                    ));
                }
                if self.part_size_bytes < MIN_PART_SIZE_BYTES {
                    return Err(anyhow::anyhow!(
                        "UPLOAD_PART_SIZE_MB must be at least 5 for S3 storage"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }

    /// The bucket name, or the local root for the filesystem backend.
    pub fn bucket_label(&self) -> String {
        match (&self.s3, &self.local_storage_path) {
            (Some(s3), _) => s3.bucket.clone(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => String::new(),
        }
    }

    pub fn min_disk_free_bytes(&self) -> u64 {
        self.min_disk_free_gb.saturating_mul(1024 * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn r2_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("R2_ENDPOINT", "https://account.r2.cloudflarestorage.com"),
            ("R2_ACCESS_KEY_ID", "key"),
            ("R2_SECRET_ACCESS_KEY", "secret"),
            ("R2_BUCKET_NAME", "videos"),
        ]
    }

    #[test]
    fn test_s3_defaults() {
        let config = TransferConfig::from_lookup(lookup(&r2_env())).unwrap();
        let s3 = config.s3.as_ref().unwrap();

        assert_eq!(config.storage_backend, StorageBackend::S3);
        assert_eq!(s3.region, "auto");
        assert!(s3.force_path_style);
        assert_eq!(config.topology, Topology::StreamToStream);
        assert_eq!(config.part_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.upload_concurrency, 4);
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert_eq!(config.disk_check_behavior, DiskCheckBehavior::Fail);
        assert_eq!(config.bucket_label(), "videos");
    }

    #[test]
    fn test_oversized_megabyte_values_are_errors() {
        let mut env = r2_env();
        env.push(("UPLOAD_PART_SIZE_MB", "18446744073709551615"));
        let err = TransferConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(err.to_string().contains("UPLOAD_PART_SIZE_MB"));

        let mut env = r2_env();
        env.push(("DEFAULT_SOURCE_SIZE_MB", "18446744073709551615"));
        let err = TransferConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_SOURCE_SIZE_MB"));
    }

    #[test]
    fn test_legacy_endpoint_alias() {
        let mut env = r2_env();
        env.retain(|(k, _)| *k != "R2_ENDPOINT");
        env.push(("R2_API_ENDPOINT", "https://legacy.example.com"));

        let config = TransferConfig::from_lookup(lookup(&env)).unwrap();
        assert_eq!(
            config.s3.unwrap().endpoint,
            "https://legacy.example.com".to_string()
        );
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let env = vec![("R2_ENDPOINT", "https://x.example.com")];
        let err = TransferConfig::from_lookup(lookup(&env)).unwrap_err();
        assert!(err.to_string().contains("R2_ACCESS_KEY_ID"));
    }

    #[test]
    fn test_small_parts_rejected_for_s3() {
        let mut env = r2_env();
        env.push(("UPLOAD_PART_SIZE_MB", "1"));
        assert!(TransferConfig::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut env = r2_env();
        env.push(("UPLOAD_CONCURRENCY", "0"));
        assert!(TransferConfig::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn test_local_backend_and_topology() {
        let env = vec![
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", "/tmp/bucket"),
            ("TRANSFER_TOPOLOGY", "download"),
            ("DISK_CHECK_BEHAVIOR", "warn"),
        ];
        let config = TransferConfig::from_lookup(lookup(&env)).unwrap();

        assert_eq!(config.storage_backend, StorageBackend::Local);
        assert!(config.s3.is_none());
        assert_eq!(config.topology, Topology::DownloadTransformUpload);
        assert_eq!(config.disk_check_behavior, DiskCheckBehavior::Warn);
    }

    #[test]
    fn test_local_backend_requires_path() {
        let env = vec![("STORAGE_BACKEND", "local")];
        assert!(TransferConfig::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn test_invalid_topology_rejected() {
        let mut env = r2_env();
        env.push(("TRANSFER_TOPOLOGY", "teleport"));
        assert!(TransferConfig::from_lookup(lookup(&env)).is_err());
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = TransferConfig::from_lookup(lookup(&r2_env())).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret\""));
        assert!(debug.contains("<redacted>"));
    }
}
