//! The production `BlobStore`: an S3-compatible object store reached via
//! `aws-sdk-s3`, pared down to exactly the put/get/delete/sign_get surface
//! the Artifact Pipeline needs (no multipart — every artifact here is a
//! single image or 3D model well under any multipart threshold).

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream as S3ByteStream;
use aws_sdk_s3::Client;

use crate::error::BlobError;
use crate::store::{BlobStore, ByteStream, GetResult, PutResult, SignedUrlBlobStore, StoreCapabilities};

pub struct S3BlobStore {
    client: Client,
    bucket: String,
    is_public: bool,
}

impl S3BlobStore {
    pub async fn connect(endpoint_url: &str, service_key: &str, bucket: impl Into<String>, is_public: bool) -> Self {
        let credentials = Credentials::new(service_key, service_key, None, None, "gateway-blob");
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .credentials_provider(credentials)
            .endpoint_url(endpoint_url)
            .load()
            .await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(true)
                .build(),
        );

        Self {
            client,
            bucket: bucket.into(),
            is_public,
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, content_type: Option<&str>, stream: ByteStream) -> crate::error::BlobResult<PutResult> {
        let size_bytes = stream.len() as u64;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(S3ByteStream::from(stream));
        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }
        let output = request.send().await.map_err(BlobError::backend)?;
        Ok(PutResult {
            etag: output.e_tag().map(|s| s.to_string()),
            size_bytes,
        })
    }

    async fn get(&self, key: &str) -> crate::error::BlobResult<GetResult> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(BlobError::backend)?;
        let content_type = output.content_type().map(|s| s.to_string());
        let bytes = output
            .body
            .collect()
            .await
            .map_err(BlobError::backend)?
            .into_bytes()
            .to_vec();
        Ok(GetResult { bytes, content_type })
    }

    async fn delete(&self, key: &str) -> crate::error::BlobResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(BlobError::backend)?;
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            is_public: self.is_public,
            supports_signed_urls: true,
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl SignedUrlBlobStore for S3BlobStore {
    async fn sign_get(&self, key: &str, expires_in_secs: u64) -> crate::error::BlobResult<String> {
        let presign_config = PresigningConfig::expires_in(Duration::from_secs(expires_in_secs))
            .map_err(BlobError::backend)?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(BlobError::backend)?;
        Ok(presigned.uri().to_string())
    }
}
