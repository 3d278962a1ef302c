use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;
use std::time::Duration;

use super::object_store::{
    ObjectStore, ObjectStoreError, SignedUrl, content_type_for, expiry_from_now,
};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
    url_ttl: Duration,
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String, url_ttl: Duration) -> Self {
        Self {
            client,
            bucket_name,
            url_ttl,
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }
}

#[async_trait]
impl ObjectStore for S3Service {
    fn url_ttl(&self) -> Duration {
        self.url_ttl
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        object_name: &str,
    ) -> Result<(), ObjectStoreError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| ObjectStoreError::S3(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(object_name)
            .body(body)
            .content_type(content_type_for(object_name))
            .send()
            .await
            .map_err(|e| ObjectStoreError::S3(DisplayErrorContext(&e).to_string()))?;

        log::debug!("Uploaded s3://{}/{}", self.bucket_name, object_name);
        Ok(())
    }

    async fn signed_url(
        &self,
        object_name: &str,
        ttl: Duration,
    ) -> Result<SignedUrl, ObjectStoreError> {
        let presigning =
            PresigningConfig::expires_in(ttl).map_err(|_| ObjectStoreError::InvalidTtl(ttl))?;
        let expires_at = expiry_from_now(ttl)?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(object_name)
            .presigned(presigning)
            .await
            .map_err(|e| ObjectStoreError::S3(DisplayErrorContext(&e).to_string()))?;

        Ok(SignedUrl {
            url: request.uri().to_string(),
            expires_at,
        })
    }
}
