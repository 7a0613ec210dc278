//! S3 archive storage
//!
//! Streams an archive into a bucket as a multipart upload. Parts are only
//! sent once `part_size` bytes have accumulated, and an archive smaller than
//! one part is stored with a single `PutObject`. Nothing becomes visible in
//! the bucket until the sink is committed.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use tracing::{debug, error, info, warn};

use crate::error::BackupError;
use crate::service::{ArchiveSink, Disposition, SinkProvider};

/// Smallest part S3 accepts, except for the last one
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Connection settings for the archive bucket
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub access_key: String,
    pub secret_key: String,
    /// Storage domain, e.g. "s3-eu-west-1.amazonaws.com"
    pub domain: String,
    pub region: String,
    pub bucket: String,
    pub part_size: usize,
}

/// Hands out one [`S3Sink`] per archive
pub struct S3SinkProvider {
    client: Client,
    bucket: String,
    part_size: usize,
}

impl S3SinkProvider {
    /// Builds a client using static credentials against the configured domain
    ///
    /// Requests use path-style addressing since bucket names containing
    /// dots break virtual-host TLS certificates.
    pub async fn new(settings: S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key,
            settings.secret_key,
            None,
            None,
            "coldvault-static",
        );

        let shared = aws_config::ConfigLoader::default()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(settings.region))
            .endpoint_url(endpoint_url(&settings.domain))
            .load()
            .await;

        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        info!(
            domain = %settings.domain,
            bucket = %settings.bucket,
            part_size = settings.part_size,
            "S3 client initialized"
        );

        Self {
            client: Client::from_conf(config),
            bucket: settings.bucket,
            part_size: settings.part_size.max(MIN_PART_SIZE),
        }
    }
}

impl SinkProvider for S3SinkProvider {
    fn writer(&self, key: &str) -> Result<Box<dyn ArchiveSink>, BackupError> {
        if key.is_empty() {
            return Err(BackupError::upload("object key cannot be empty"));
        }

        Ok(Box::new(S3Sink {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            buffer: PartBuffer::new(self.part_size),
            upload: None,
        }))
    }
}

/// Write handle for a single object
pub struct S3Sink {
    client: Client,
    bucket: String,
    key: String,
    buffer: PartBuffer,
    upload: Option<MultipartUpload>,
}

/// An in-progress multipart upload
struct MultipartUpload {
    upload_id: String,
    parts: Vec<CompletedPart>,
}

impl S3Sink {
    async fn start_upload(&self) -> Result<MultipartUpload, BackupError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type("application/gzip")
            .send()
            .await
            .map_err(|e| s3_error("create multipart upload", e))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| BackupError::upload("multipart upload id missing from response"))?
            .to_string();

        info!(key = %self.key, upload_id = %upload_id, "Started multipart upload");
        Ok(MultipartUpload {
            upload_id,
            parts: Vec::new(),
        })
    }

    async fn send_part(
        &self,
        upload: &mut MultipartUpload,
        data: Vec<u8>,
    ) -> Result<(), BackupError> {
        let part_number = upload.parts.len() as i32 + 1;
        let size = data.len();

        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| s3_error("upload part", e))?;

        upload.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .set_e_tag(response.e_tag().map(str::to_string))
                .build(),
        );

        debug!(key = %self.key, part_number, bytes = size, "Uploaded part");
        Ok(())
    }

    /// Sends `data` as the next part, starting the upload if needed
    async fn push_part(&mut self, data: Vec<u8>) -> Result<(), BackupError> {
        let mut upload = match self.upload.take() {
            Some(upload) => upload,
            None => self.start_upload().await?,
        };

        let sent = self.send_part(&mut upload, data).await;
        self.upload = Some(upload);
        sent
    }

    async fn put_whole(&mut self) -> Result<(), BackupError> {
        let data = self.buffer.take_rest();
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type("application/gzip")
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| s3_error("put object", e))?;

        info!(key = %self.key, bytes = size, "Stored archive in a single request");
        Ok(())
    }

    async fn complete(&mut self, mut upload: MultipartUpload) -> Result<(), BackupError> {
        let rest = self.buffer.take_rest();
        if !rest.is_empty() {
            if let Err(e) = self.send_part(&mut upload, rest).await {
                self.abort(upload).await?;
                return Err(e);
            }
        }

        let parts = upload.parts.len();
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(upload.parts.clone()))
            .build();

        let result = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload.upload_id)
            .multipart_upload(completed)
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(key = %self.key, parts, "Completed multipart upload");
                Ok(())
            }
            Err(e) => {
                let err = s3_error("complete multipart upload", e);
                self.abort(upload).await?;
                Err(err)
            }
        }
    }

    async fn abort(&mut self, upload: MultipartUpload) -> Result<(), BackupError> {
        self.buffer.take_rest();

        match self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload.upload_id)
            .send()
            .await
        {
            Ok(_) => {
                warn!(key = %self.key, upload_id = %upload.upload_id, "Aborted multipart upload");
                Ok(())
            }
            Err(e) => {
                error!(
                    key = %self.key,
                    upload_id = %upload.upload_id,
                    error = %DisplayErrorContext(&e),
                    "Could not abort multipart upload, parts may linger until the bucket lifecycle removes them"
                );
                Err(s3_error("abort multipart upload", e))
            }
        }
    }
}

#[async_trait]
impl ArchiveSink for S3Sink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), BackupError> {
        self.buffer.push(chunk);
        while let Some(part) = self.buffer.next_full() {
            self.push_part(part).await?;
        }
        Ok(())
    }

    async fn close(&mut self, disposition: Disposition) -> Result<(), BackupError> {
        match (disposition, self.upload.take()) {
            (Disposition::Commit, None) => self.put_whole().await,
            (Disposition::Commit, Some(upload)) => self.complete(upload).await,
            (Disposition::Discard, Some(upload)) => self.abort(upload).await,
            (Disposition::Discard, None) => {
                self.buffer.take_rest();
                info!(key = %self.key, "Discarded archive before anything was stored");
                Ok(())
            }
        }
    }
}

/// Accumulates bytes until a full part is available
struct PartBuffer {
    data: Vec<u8>,
    part_size: usize,
}

impl PartBuffer {
    fn new(part_size: usize) -> Self {
        Self {
            data: Vec::new(),
            part_size,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.data.extend_from_slice(chunk);
    }

    /// Removes and returns exactly `part_size` bytes, if buffered
    fn next_full(&mut self) -> Option<Vec<u8>> {
        if self.data.len() < self.part_size {
            return None;
        }
        let rest = self.data.split_off(self.part_size);
        Some(std::mem::replace(&mut self.data, rest))
    }

    fn take_rest(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

/// Endpoint URL for a storage domain; https unless a scheme is given
fn endpoint_url(domain: &str) -> String {
    if domain.contains("://") {
        domain.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", domain.trim_end_matches('/'))
    }
}

fn s3_error<E: std::error::Error>(operation: &str, err: E) -> BackupError {
    BackupError::upload(format!("{operation} failed: {}", DisplayErrorContext(err)))
}
