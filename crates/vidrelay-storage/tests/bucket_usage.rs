use bytes::Bytes;
use std::sync::Arc;
use tempfile::TempDir;
use vidrelay_storage::{BucketUsageReporter, LocalStorage, ObjectStorage};

async fn put(storage: &LocalStorage, key: &str, size: usize) {
    let id = storage.create_multipart(key, "video/mp4").await.unwrap();
    let part = storage
        .upload_part(key, &id, 1, Bytes::from(vec![7u8; size]))
        .await
        .unwrap();
    storage.complete_multipart(key, &id, vec![part]).await.unwrap();
}

#[tokio::test]
async fn test_empty_bucket_reports_zero() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(dir.path()).await.unwrap());
    let summary = BucketUsageReporter::new(storage, 1000)
        .summarize()
        .await
        .unwrap();
    assert_eq!(summary.total_bytes, 0);
    assert_eq!(summary.object_count, 0);
    assert_eq!(summary.total_mb_display(), "0.00");
}

#[tokio::test]
async fn test_single_page() {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path()).await.unwrap();
    put(&storage, "a.mp4", 100).await;
    put(&storage, "b.mp4", 250).await;

    let summary = BucketUsageReporter::new(Arc::new(storage), 1000)
        .summarize()
        .await
        .unwrap();
    assert_eq!(summary.total_bytes, 350);
    assert_eq!(summary.object_count, 2);
}

#[tokio::test]
async fn test_sums_across_pages() {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path()).await.unwrap();
    let mut expected = 0u64;
    for i in 0..7 {
        let size = 10 * (i + 1);
        put(&storage, &format!("clips/{:02}.mp4", i), size).await;
        expected += size as u64;
    }

    let storage: Arc<dyn ObjectStorage> = Arc::new(storage);
    let paged = BucketUsageReporter::new(Arc::clone(&storage), 3)
        .summarize()
        .await
        .unwrap();
    let unpaged = BucketUsageReporter::new(storage, 1000)
        .summarize()
        .await
        .unwrap();

    assert_eq!(paged.total_bytes, expected);
    assert_eq!(paged.object_count, 7);
    assert_eq!(paged, unpaged);
}

#[tokio::test]
async fn test_repeated_calls_are_stable() {
    let dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(dir.path()).await.unwrap();
    put(&storage, "x.mp4", 4096).await;

    let reporter = BucketUsageReporter::new(Arc::new(storage), 1);
    let first = reporter.summarize().await.unwrap();
    let second = reporter.summarize().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.total_bytes, 4096);
}
