use crate::keys::validate_key;
use crate::traits::{
    ListPage, ObjectStorage, ObjectSummary, StorageError, StorageResult, UploadedPart,
};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use vidrelay_core::S3Settings;

/// Error codes that mean the request will never succeed as configured
const REJECTION_CODES: &[&str] = &[
    "AccessDenied",
    "AccountProblem",
    "InvalidAccessKeyId",
    "InvalidBucketName",
    "NoSuchBucket",
    "NoSuchUpload",
    "SignatureDoesNotMatch",
    "EntityTooSmall",
    "InvalidPart",
    "InvalidPartOrder",
];

/// S3-compatible storage implementation (AWS S3, Cloudflare R2, MinIO)
///
/// SDK-level retries are disabled: a failed request surfaces immediately and
/// the run fails with a retriable error instead of stalling.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance from explicit credentials and endpoint
    pub async fn new(settings: &S3Settings) -> StorageResult<Self> {
        if settings.bucket.trim().is_empty() {
            return Err(StorageError::ConfigError("bucket name is empty".to_string()));
        }

        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "vidrelay-env",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(settings.endpoint.clone())
            .retry_config(RetryConfig::disabled())
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style)
            .build();

        tracing::debug!(
            endpoint = %settings.endpoint,
            bucket = %settings.bucket,
            region = %settings.region,
            "S3 client configured"
        );

        Ok(S3Storage {
            client: Client::from_conf(s3_config),
            bucket: settings.bucket.clone(),
        })
    }
}

fn is_rejection(code: Option<&str>, status: Option<u16>) -> bool {
    if let Some(code) = code {
        if REJECTION_CODES.contains(&code) {
            return true;
        }
    }
    matches!(status, Some(400 | 401 | 403 | 404 | 405 | 411 | 413))
}

/// Split SDK failures into rejections (won't succeed on retry) and
/// interruptions (network, timeout, throttling, 5xx).
fn classify_sdk_error<E>(err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ServiceError(_) | SdkError::ResponseError(_) => {
            let status = err.raw_response().map(|r| r.status().as_u16());
            if is_rejection(err.code(), status) {
                StorageError::Rejected(message)
            } else {
                StorageError::Interrupted(message)
            }
        }
        SdkError::ConstructionFailure(_) => StorageError::Rejected(message),
        _ => StorageError::Interrupted(message),
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart(&self, key: &str, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;

        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                let err = classify_sdk_error(e);
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket,
                    key = %key,
                    "Failed to create multipart upload"
                );
                err
            })?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::Interrupted("No upload ID returned from S3".to_string()))?
            .to_string();

        tracing::debug!(bucket = %self.bucket, key = %key, upload_id = %upload_id, "S3 multipart upload created");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<UploadedPart> {
        let size_bytes = data.len() as u64;

        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                let err = classify_sdk_error(e);
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket,
                    key = %key,
                    part_number = part_number,
                    "Failed to upload part"
                );
                err
            })?;

        let e_tag = uploaded
            .e_tag()
            .ok_or_else(|| {
                StorageError::Interrupted(format!("No ETag returned for part {}", part_number))
            })?
            .to_string();

        Ok(UploadedPart {
            part_number,
            e_tag,
            size_bytes,
        })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let part_count = parts.len();
        let size_bytes: u64 = parts.iter().map(|p| p.size_bytes).sum();

        let completed_parts = parts
            .into_iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.e_tag)
                    .build()
            })
            .collect::<Vec<_>>();

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                let err = classify_sdk_error(e);
                tracing::error!(
                    error = %err,
                    bucket = %self.bucket,
                    key = %key,
                    "Failed to complete multipart upload"
                );
                err
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size_bytes,
            parts = part_count,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 multipart upload completed"
        );
        Ok(())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        tracing::debug!(bucket = %self.bucket, key = %key, upload_id = %upload_id, "S3 multipart upload aborted");
        Ok(())
    }

    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> StorageResult<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(max_keys)
            .set_continuation_token(continuation_token)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?.to_string();
                let size_bytes = object.size().unwrap_or(0).max(0) as u64;
                Some(ObjectSummary { key, size_bytes })
            })
            .collect();

        let next_continuation_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_continuation_token,
        })
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(head.content_length().unwrap_or(0).max(0) as u64),
            Err(e) => {
                if e.as_service_error().map(|se| se.is_not_found()) == Some(true) {
                    Err(StorageError::NotFound(key.to_string()))
                } else {
                    Err(classify_sdk_error(e))
                }
            }
        }
    }
}
