use crate::keys::validate_key;
use crate::traits::{
    ListPage, ObjectStorage, ObjectSummary, StorageError, StorageResult, UploadedPart,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Directory under the root where in-progress uploads are staged
const STAGING_DIR: &str = ".multipart";
const KEY_FILE: &str = "key";
const ASSEMBLED_FILE: &str = "assembled";

/// Local filesystem storage implementation
///
/// Objects live at `<base_path>/<key>`. Multipart parts are written under
/// `<base_path>/.multipart/<upload_id>/` and concatenated into place with a
/// single rename on completion, so listings never see a partial object.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    label: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance rooted at `base_path`
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let label = base_path.display().to_string();
        Ok(LocalStorage { base_path, label })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Convert storage key to filesystem path with security validation
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        if key == STAGING_DIR || key.starts_with(&format!("{}/", STAGING_DIR)) {
            return Err(StorageError::InvalidKey(format!(
                "{} is reserved for in-progress uploads",
                STAGING_DIR
            )));
        }
        Ok(self.base_path.join(key))
    }

    fn staging_path(&self, upload_id: &str) -> StorageResult<PathBuf> {
        if upload_id.is_empty() || !upload_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(StorageError::NoSuchUpload(upload_id.to_string()));
        }
        Ok(self.base_path.join(STAGING_DIR).join(upload_id))
    }

    fn part_path(staging: &Path, part_number: i32) -> PathBuf {
        staging.join(format!("part-{:05}", part_number))
    }

    /// Ensure the upload exists and was started for `key`
    async fn open_upload(&self, key: &str, upload_id: &str) -> StorageResult<PathBuf> {
        let staging = self.staging_path(upload_id)?;
        let recorded = match fs::read_to_string(staging.join(KEY_FILE)).await {
            Ok(recorded) => recorded,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NoSuchUpload(upload_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if recorded != key {
            return Err(StorageError::NoSuchUpload(format!(
                "{} was started for a different key",
                upload_id
            )));
        }
        Ok(staging)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Every committed object, sorted by key. The staging directory is skipped.
    async fn collect_objects(&self) -> StorageResult<Vec<ObjectSummary>> {
        let mut objects = Vec::new();
        let mut pending = vec![self.base_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if dir == self.base_path && entry.file_name() == STAGING_DIR {
                        continue;
                    }
                    pending.push(path);
                } else if file_type.is_file() {
                    let Ok(relative) = path.strip_prefix(&self.base_path) else {
                        continue;
                    };
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    let size_bytes = entry.metadata().await?.len();
                    objects.push(ObjectSummary { key, size_bytes });
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn bucket(&self) -> &str {
        &self.label
    }

    async fn create_multipart(&self, key: &str, _content_type: &str) -> StorageResult<String> {
        self.key_to_path(key)?;

        let upload_id = Uuid::new_v4().to_string();
        let staging = self.staging_path(&upload_id)?;
        fs::create_dir_all(&staging).await?;
        fs::write(staging.join(KEY_FILE), key).await?;

        tracing::debug!(key = %key, upload_id = %upload_id, "Local multipart upload created");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<UploadedPart> {
        if part_number < 1 {
            return Err(StorageError::Rejected(format!(
                "part number must be positive, got {}",
                part_number
            )));
        }
        let staging = self.open_upload(key, upload_id).await?;
        let path = Self::part_path(&staging, part_number);

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        Ok(UploadedPart {
            part_number,
            e_tag: Uuid::new_v4().simple().to_string(),
            size_bytes: data.len() as u64,
        })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let staging = self.open_upload(key, upload_id).await?;
        let path = self.key_to_path(key)?;

        let assembled_path = staging.join(ASSEMBLED_FILE);
        let mut assembled = fs::File::create(&assembled_path).await?;
        let mut total: u64 = 0;
        for part in &parts {
            let part_path = Self::part_path(&staging, part.part_number);
            let mut part_file = fs::File::open(&part_path).await.map_err(|_| {
                StorageError::Rejected(format!("part {} was never uploaded", part.part_number))
            })?;
            total += tokio::io::copy(&mut part_file, &mut assembled).await?;
        }
        assembled.sync_all().await?;
        drop(assembled);

        self.ensure_parent_dir(&path).await?;
        fs::rename(&assembled_path, &path).await?;
        fs::remove_dir_all(&staging).await?;

        tracing::info!(
            path = %path.display(),
            key = %key,
            parts = parts.len(),
            size_bytes = total,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local multipart upload completed"
        );
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let staging = self.staging_path(upload_id)?;
        match fs::remove_dir_all(&staging).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(key = %key, upload_id = %upload_id, "Local multipart upload aborted");
        Ok(())
    }

    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> StorageResult<ListPage> {
        let max_keys = usize::try_from(max_keys)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| StorageError::ConfigError(format!("invalid page size {}", max_keys)))?;

        let mut remaining: Vec<ObjectSummary> = self
            .collect_objects()
            .await?
            .into_iter()
            .filter(|o| match &continuation_token {
                Some(after) => o.key.as_str() > after.as_str(),
                None => true,
            })
            .collect();

        let has_more = remaining.len() > max_keys;
        remaining.truncate(max_keys);
        let next_continuation_token = if has_more {
            remaining.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: remaining,
            next_continuation_token,
        })
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let path = self.key_to_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("bucket")).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_object_visible_only_after_complete() {
        let (_dir, storage) = storage().await;
        let id = storage.create_multipart("a/b.mp4", "video/mp4").await.unwrap();
        let p1 = storage
            .upload_part("a/b.mp4", &id, 1, Bytes::from_static(b"hello "))
            .await
            .unwrap();
        let p2 = storage
            .upload_part("a/b.mp4", &id, 2, Bytes::from_static(b"world"))
            .await
            .unwrap();

        let page = storage.list_objects_page(None, 10).await.unwrap();
        assert!(page.objects.is_empty());

        storage
            .complete_multipart("a/b.mp4", &id, vec![p1, p2])
            .await
            .unwrap();

        let page = storage.list_objects_page(None, 10).await.unwrap();
        assert_eq!(
            page.objects,
            vec![ObjectSummary {
                key: "a/b.mp4".to_string(),
                size_bytes: 11
            }]
        );
        let bytes = fs::read(storage.base_path().join("a/b.mp4")).await.unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[tokio::test]
    async fn test_abort_discards_parts() {
        let (_dir, storage) = storage().await;
        let id = storage.create_multipart("x.mp4", "video/mp4").await.unwrap();
        storage
            .upload_part("x.mp4", &id, 1, Bytes::from_static(b"data"))
            .await
            .unwrap();
        storage.abort_multipart("x.mp4", &id).await.unwrap();

        assert!(!storage.base_path().join(STAGING_DIR).join(&id).exists());
        assert!(matches!(
            storage.content_length("x.mp4").await,
            Err(StorageError::NotFound(_))
        ));
        // Aborting twice is harmless
        storage.abort_multipart("x.mp4", &id).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_upload_is_rejected() {
        let (_dir, storage) = storage().await;
        let err = storage
            .upload_part("x.mp4", "missing", 1, Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NoSuchUpload(_)));
    }

    #[tokio::test]
    async fn test_reserved_and_traversal_keys_rejected() {
        let (_dir, storage) = storage().await;
        assert!(storage.create_multipart("../escape.mp4", "video/mp4").await.is_err());
        assert!(storage
            .create_multipart(".multipart/x.mp4", "video/mp4")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_listing_pages_in_key_order() {
        let (_dir, storage) = storage().await;
        for key in ["c.mp4", "a.mp4", "b/d.mp4"] {
            let id = storage.create_multipart(key, "video/mp4").await.unwrap();
            let part = storage
                .upload_part(key, &id, 1, Bytes::from_static(b"x"))
                .await
                .unwrap();
            storage.complete_multipart(key, &id, vec![part]).await.unwrap();
        }

        let first = storage.list_objects_page(None, 2).await.unwrap();
        let keys: Vec<_> = first.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.mp4", "b/d.mp4"]);
        assert_eq!(first.next_continuation_token.as_deref(), Some("b/d.mp4"));

        let second = storage
            .list_objects_page(first.next_continuation_token, 2)
            .await
            .unwrap();
        let keys: Vec<_> = second.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["c.mp4"]);
        assert!(second.next_continuation_token.is_none());
    }
}
