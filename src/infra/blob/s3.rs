use async_trait::async_trait;
use aws_sdk_s3::{Client, error::ProvideErrorMetadata, primitives::ByteStream};
use bytes::Bytes;

use crate::application::ports::{BlobError, BlobStore};

/// Connection options for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Options {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services; `None` uses AWS.
    pub endpoint: Option<String>,
    pub force_path_style: bool,
}

/// Blobs stored as objects in one bucket, keyed by blob path.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Build a client from the ambient AWS credential chain.
    pub async fn connect(options: S3Options) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(options.region.clone()));
        if let Some(endpoint) = &options.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(options.force_path_style)
            .build();

        Self {
            client: Client::from_conf(config),
            bucket: options.bucket,
        }
    }
}

fn backend_error(op: &str, err: impl std::fmt::Display) -> BlobError {
    BlobError::Backend(format!("{op}: {err}"))
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, path: &str) -> Result<Bytes, BlobError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    BlobError::NotFound(path.to_string())
                } else {
                    backend_error("get_object", service)
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|err| backend_error("get_object body", err))?;
        Ok(body.into_bytes())
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<(), BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| backend_error("put_object", err.into_service_error()))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|err| backend_error("list_objects_v2", err.into_service_error()))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter(|key| !key.ends_with('/'))
                    .map(str::to_string),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, encode_key(from)))
            .key(to)
            .send()
            .await
            .map_err(|err| {
                let service = err.into_service_error();
                if service.code() == Some("NoSuchKey") {
                    BlobError::NotFound(from.to_string())
                } else {
                    backend_error("copy_object", service)
                }
            })?;
        Ok(())
    }
}

/// Percent-encode a key for the `x-amz-copy-source` header, keeping `/` separators.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| url::form_urlencoded::byte_serialize(segment.as_bytes()).collect::<String>())
        .map(|segment| segment.replace('+', "%20"))
        .collect::<Vec<_>>()
        .join("/")
}
