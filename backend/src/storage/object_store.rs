use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid object name: {0}")]
    InvalidName(String),
    #[error("signed URL validity {0:?} is not supported")]
    InvalidTtl(Duration),
    #[error("signing key rejected")]
    InvalidKey,
    #[error("signature mismatch")]
    BadSignature,
    #[error("signed URL expired")]
    Expired,
    #[error("object not found: {0}")]
    NotFound(String),
}

/// Time-boxed GET capability for one stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Durable storage for uploaded images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Validity of the URL returned by [`ObjectStore::upload`].
    fn url_ttl(&self) -> Duration;

    /// Stores the file at `local_path` as `object_name`. Not retried.
    async fn upload_file(
        &self,
        local_path: &Path,
        object_name: &str,
    ) -> Result<(), ObjectStoreError>;

    /// Mints a URL for an existing object. Needs only the name and the signing credential.
    async fn signed_url(
        &self,
        object_name: &str,
        ttl: Duration,
    ) -> Result<SignedUrl, ObjectStoreError>;

    async fn upload(
        &self,
        local_path: &Path,
        object_name: &str,
    ) -> Result<SignedUrl, ObjectStoreError> {
        self.upload_file(local_path, object_name).await?;
        self.signed_url(object_name, self.url_ttl()).await
    }
}

pub fn content_type_for(object_name: &str) -> &'static str {
    let extension = object_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

pub fn expiry_from_now(ttl: Duration) -> Result<DateTime<Utc>, ObjectStoreError> {
    let delta = chrono::Duration::from_std(ttl).map_err(|_| ObjectStoreError::InvalidTtl(ttl))?;
    Utc::now()
        .checked_add_signed(delta)
        .ok_or(ObjectStoreError::InvalidTtl(ttl))
}
