use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::Path;

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::bucket::BucketProfile;
use crate::store::{validate_key, ObjectStore, StoreError};

/// Files larger than this are sent as multipart uploads.
pub const MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;
pub const PART_SIZE: u64 = 50_000 * 1024;

/// Amazon S3 backend. Requests run to completion on a private
/// current-thread runtime so the store stays synchronous.
pub struct S3ObjectStore {
    client: Client,
    runtime: Runtime,
}

impl S3ObjectStore {
    /// Loads credentials and region from the named shared-config profile.
    pub fn connect(profile: &BucketProfile, region: Option<&str>) -> Result<Self, StoreError> {
        let runtime = build_runtime()?;
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).profile_name(&profile.profile);
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let config = runtime.block_on(loader.load());
        info!(
            "using AWS profile {} for bucket {}",
            profile.profile, profile.bucket
        );
        Ok(Self {
            client: Client::new(&config),
            runtime,
        })
    }

    pub fn from_client(client: Client) -> Result<Self, StoreError> {
        Ok(Self {
            client,
            runtime: build_runtime()?,
        })
    }

    async fn put_single(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|err| body_error(local_path, err))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|err| sdk_error(err, bucket, Some(key)))?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        size: u64,
    ) -> Result<(), StoreError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| sdk_error(err, bucket, Some(key)))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Backend {
                message: format!("no multipart upload id returned for {key}"),
            })?
            .to_string();

        let parts = match self
            .upload_parts(bucket, key, local_path, size, &upload_id)
            .await
        {
            Ok(parts) => parts,
            Err(err) => {
                warn!("aborting multipart upload of {}: {}", key, err);
                if let Err(abort) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(
                        "failed to abort multipart upload {}: {}",
                        upload_id,
                        DisplayErrorContext(&abort)
                    );
                }
                return Err(err);
            }
        };

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| sdk_error(err, bucket, Some(key)))?;
        Ok(())
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        size: u64,
        upload_id: &str,
    ) -> Result<Vec<CompletedPart>, StoreError> {
        let ranges = part_ranges(size, PART_SIZE);
        let mut parts = Vec::with_capacity(ranges.len());
        for (index, (offset, length)) in ranges.into_iter().enumerate() {
            let part_number = i32::try_from(index + 1).map_err(|_| StoreError::Backend {
                message: format!("{key} needs more parts than a multipart upload allows"),
            })?;
            let body = ByteStream::read_from()
                .path(local_path)
                .offset(offset)
                .length(Length::Exact(length))
                .build()
                .await
                .map_err(|err| body_error(local_path, err))?;
            let uploaded = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(|err| sdk_error(err, bucket, Some(key)))?;
            debug!("uploaded part {} of {} ({} bytes)", part_number, key, length);
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .build(),
            );
        }
        Ok(parts)
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, StoreError> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|service| service.is_not_found()) =>
            {
                Ok(false)
            }
            Err(err) => Err(sdk_error(err, bucket, Some(key))),
        }
    }

    async fn delete_existing(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        if !self.object_exists(bucket, key).await? {
            return Err(StoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| sdk_error(err, bucket, Some(key)))?;
        Ok(())
    }

    // TODO: use UploadPartCopy for sources above the 5 GiB CopyObject limit.
    async fn copy_object(
        &self,
        bucket: &str,
        source_key: &str,
        dest_key: &str,
    ) -> Result<(), StoreError> {
        self.client
            .copy_object()
            .bucket(bucket)
            .copy_source(copy_source(bucket, source_key))
            .key(dest_key)
            .send()
            .await
            .map_err(|err| sdk_error(err, bucket, Some(source_key)))?;
        Ok(())
    }

    async fn list_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(ref token) = continuation_token {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .map_err(|err| sdk_error(err, bucket, None))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl ObjectStore for S3ObjectStore {
    fn put(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StoreError> {
        validate_key(key)?;
        let size = fs::metadata(local_path)
            .map_err(|err| StoreError::Io {
                path: local_path.to_path_buf(),
                source: err,
            })?
            .len();
        if size > MULTIPART_THRESHOLD {
            debug!("{} is {} bytes, using multipart upload", key, size);
            self.runtime
                .block_on(self.put_multipart(bucket, key, local_path, size))
        } else {
            self.runtime.block_on(self.put_single(bucket, key, local_path))
        }
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.runtime.block_on(self.delete_existing(bucket, key))
    }

    fn copy(&self, bucket: &str, source_key: &str, dest_key: &str) -> Result<(), StoreError> {
        validate_key(dest_key)?;
        self.runtime
            .block_on(self.copy_object(bucket, source_key, dest_key))
    }

    fn list_keys_with_prefix(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.runtime.block_on(self.list_prefix(bucket, prefix))
    }
}

fn build_runtime() -> Result<Runtime, StoreError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| StoreError::Backend {
            message: format!("failed to start the S3 client runtime: {err}"),
        })
}

/// Byte ranges `(offset, length)` covering a file of `size` bytes.
pub fn part_ranges(size: u64, part_size: u64) -> Vec<(u64, u64)> {
    let part_size = part_size.max(1);
    let mut ranges = Vec::new();
    let mut offset = 0;
    while offset < size {
        let length = part_size.min(size - offset);
        ranges.push((offset, length));
        offset += length;
    }
    ranges
}

// CopyObject takes `bucket/key` with the key percent-encoded.
fn copy_source(bucket: &str, key: &str) -> String {
    let mut encoded = String::with_capacity(bucket.len() + key.len() + 1);
    encoded.push_str(bucket);
    encoded.push('/');
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(char::from(byte))
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn body_error(path: &Path, err: impl std::fmt::Display) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source: io::Error::other(err.to_string()),
    }
}

fn sdk_error<E, R>(err: SdkError<E, R>, bucket: &str, key: Option<&str>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    match (err.code(), key) {
        (Some("NoSuchBucket"), _) => StoreError::NoSuchBucket {
            bucket: bucket.to_string(),
        },
        (Some("NoSuchKey"), Some(key)) => StoreError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => StoreError::Backend {
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}
