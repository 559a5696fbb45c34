//! Amazon S3 object backend.
//!
//! Containers map to buckets. Listing uses `ListObjectsV2` by prefix and a
//! `HeadObject` per entry to read user metadata. Works with S3-compatible
//! services (MinIO, LocalStack) through a custom endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use futures::future::try_join_all;
use tracing::{debug, info};

use super::{ObjectBackend, ObjectInfo, Result, StorageError};

/// Region that rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

const TRANSIENT_CODES: &[&str] = &[
    "SlowDown",
    "InternalError",
    "ServiceUnavailable",
    "RequestTimeout",
];

fn map_sdk_error<E, R>(context: &str, err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{}: {}", context, DisplayErrorContext(&err));
    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StorageError::Unavailable(message)
        }
        _ => match err.as_service_error().and_then(|e| e.code()) {
            Some("NoSuchBucket") => StorageError::MissingResource(message),
            Some(code) if TRANSIENT_CODES.contains(&code) => StorageError::Unavailable(message),
            _ => StorageError::Backend(message),
        },
    }
}

/// Amazon S3 implementation of [`ObjectBackend`].
pub struct S3ObjectBackend {
    client: Client,
    name: String,
    region: Option<String>,
}

impl S3ObjectBackend {
    /// Connect using the default credential chain.
    ///
    /// `endpoint` targets an S3-compatible service and enables path-style
    /// addressing.
    pub async fn connect(name: impl Into<String>, region: Option<&str>, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let config = loader.load().await;
        let region = config.region().map(|r| r.to_string());

        let client = if let Some(endpoint) = endpoint {
            let s3_config = aws_sdk_s3::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .force_path_style(true) // Required for MinIO and most S3-compatible services
                .build();
            Client::from_conf(s3_config)
        } else {
            Client::new(&config)
        };

        let name = name.into();
        info!(backend = %name, "Connected to S3");
        Self {
            client,
            name,
            region,
        }
    }

    /// Create with explicit client (for testing).
    pub fn with_client(client: Client, name: impl Into<String>, region: Option<String>) -> Self {
        Self {
            client,
            name: name.into(),
            region,
        }
    }

    async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(map_sdk_error("HeadObject", e)),
        }
    }

    async fn object_info(&self, bucket: &str, key: String) -> Result<Option<ObjectInfo>> {
        match self.client.head_object().bucket(bucket).key(&key).send().await {
            Ok(output) => Ok(Some(ObjectInfo {
                metadata: output.metadata().cloned().unwrap_or_default(),
                name: key,
            })),
            // Deleted between listing and head.
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(map_sdk_error("HeadObject", e)),
        }
    }
}

#[async_trait]
impl ObjectBackend for S3ObjectBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_container_if_not_exists(&self, container: &str) -> Result<bool> {
        if self.client.head_bucket().bucket(container).send().await.is_ok() {
            return Ok(false);
        }

        let mut request = self.client.create_bucket().bucket(container);
        if let Some(region) = self.region.as_deref().filter(|r| *r != DEFAULT_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(backend = %self.name, bucket = %container, "Created S3 bucket");
                Ok(true)
            }
            Err(e)
                if e.as_service_error().is_some_and(|se| {
                    se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                }) =>
            {
                Ok(false)
            }
            Err(e) => Err(map_sdk_error("CreateBucket", e)),
        }
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut keys = Vec::new();
        let mut continuation = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(container)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("ListObjectsV2", e))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) if output.is_truncated() == Some(true) => {
                    continuation = Some(token.to_string())
                }
                _ => break,
            }
        }

        let objects = try_join_all(keys.into_iter().map(|key| self.object_info(container, key)))
            .await?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        debug!(
            backend = %self.name,
            bucket = %container,
            prefix = %prefix,
            count = objects.len(),
            "S3 list"
        );
        Ok(objects)
    }

    async fn upload(
        &self,
        container: &str,
        name: &str,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(container)
            .key(name)
            .content_type("application/json")
            .set_metadata(Some(metadata))
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error("PutObject", e))?;

        debug!(backend = %self.name, bucket = %container, key = %name, size, "Stored object in S3");
        Ok(())
    }

    async fn download(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let output = match self.client.get_object().bucket(container).key(name).send().await {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => return Ok(None),
            Err(e) => return Err(map_sdk_error("GetObject", e)),
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Unavailable(format!("S3 body read failed: {}", e)))?
            .into_bytes()
            .to_vec();
        Ok(Some(body))
    }

    async fn delete_if_exists(&self, container: &str, name: &str) -> Result<bool> {
        if !self.exists(container, name).await? {
            return Ok(false);
        }

        self.client
            .delete_object()
            .bucket(container)
            .key(name)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteObject", e))?;

        debug!(backend = %self.name, bucket = %container, key = %name, "Deleted object from S3");
        Ok(true)
    }
}
