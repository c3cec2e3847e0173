use crate::traits::{ObjectStorage, StorageError, StorageResult};
use std::sync::Arc;
use vidrelay_core::UsageSummary;

/// Sums the size of every object in a bucket by walking the paginated listing.
///
/// Nothing is cached; every call lists the bucket again.
pub struct BucketUsageReporter {
    storage: Arc<dyn ObjectStorage>,
    page_size: i32,
}

impl BucketUsageReporter {
    pub fn new(storage: Arc<dyn ObjectStorage>, page_size: i32) -> Self {
        Self {
            storage,
            page_size: page_size.max(1),
        }
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.storage.bucket()))]
    pub async fn summarize(&self) -> StorageResult<UsageSummary> {
        let start = std::time::Instant::now();
        let mut summary = UsageSummary::default();
        let mut continuation: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let page = self
                .storage
                .list_objects_page(continuation.clone(), self.page_size)
                .await?;
            pages += 1;

            for object in &page.objects {
                summary.add_object(object.size_bytes);
            }

            match page.next_continuation_token {
                Some(next) if continuation.as_deref() == Some(next.as_str()) => {
                    return Err(StorageError::Interrupted(format!(
                        "listing did not advance past continuation token {}",
                        next
                    )));
                }
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        tracing::info!(
            pages = pages,
            objects = summary.object_count,
            total_bytes = summary.total_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Bucket usage computed"
        );

        Ok(summary)
    }
}
