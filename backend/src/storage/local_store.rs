use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::object_store::{ObjectStore, ObjectStoreError, SignedUrl, expiry_from_now};

type HmacSha256 = Hmac<Sha256>;

/// Bucket backed by a local directory. URLs are served by the `/objects`
/// route and signed with HMAC-SHA256 over the method, name and expiry.
#[derive(Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: String,
    keyed_mac: HmacSha256,
    url_ttl: Duration,
}

impl LocalObjectStore {
    pub fn new(
        root: PathBuf,
        public_base_url: String,
        signing_key: &str,
        url_ttl: Duration,
    ) -> Result<Self, ObjectStoreError> {
        let keyed_mac = <HmacSha256 as KeyInit>::new_from_slice(signing_key.as_bytes())
            .map_err(|_| ObjectStoreError::InvalidKey)?;
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            keyed_mac,
            url_ttl,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, object_name: &str) -> Result<PathBuf, ObjectStoreError> {
        let valid = !object_name.is_empty()
            && object_name != "."
            && object_name != ".."
            && !object_name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(ObjectStoreError::InvalidName(object_name.to_string()));
        }
        Ok(self.root.join(object_name))
    }

    fn mac(&self, object_name: &str, expires: i64) -> HmacSha256 {
        let mut mac = self.keyed_mac.clone();
        mac.update(format!("GET\n{}\n{}", object_name, expires).as_bytes());
        mac
    }

    fn sign(&self, object_name: &str, expires: i64) -> String {
        hex::encode(self.mac(object_name, expires).finalize().into_bytes())
    }

    /// Checks a presented signature and returns the object's path on disk.
    pub fn verify(
        &self,
        object_name: &str,
        expires: i64,
        signature: &str,
    ) -> Result<PathBuf, ObjectStoreError> {
        self.verify_at(object_name, expires, signature, Utc::now())
    }

    fn verify_at(
        &self,
        object_name: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, ObjectStoreError> {
        let path = self.object_path(object_name)?;
        let presented = hex::decode(signature).map_err(|_| ObjectStoreError::BadSignature)?;
        self.mac(object_name, expires)
            .verify_slice(&presented)
            .map_err(|_| ObjectStoreError::BadSignature)?;

        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or(ObjectStoreError::BadSignature)?;
        if now > expires_at {
            return Err(ObjectStoreError::Expired);
        }
        if !path.is_file() {
            return Err(ObjectStoreError::NotFound(object_name.to_string()));
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn url_ttl(&self) -> Duration {
        self.url_ttl
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        object_name: &str,
    ) -> Result<(), ObjectStoreError> {
        let destination = self.object_path(object_name)?;
        tokio::fs::copy(local_path, &destination).await?;
        log::debug!("Stored object {}", destination.display());
        Ok(())
    }

    async fn signed_url(
        &self,
        object_name: &str,
        ttl: Duration,
    ) -> Result<SignedUrl, ObjectStoreError> {
        self.object_path(object_name)?;
        let expires_at = expiry_from_now(ttl)?;
        let expires = expires_at.timestamp();
        let url = format!(
            "{}/objects/{}?expires={}&signature={}",
            self.public_base_url,
            urlencoding::encode(object_name),
            expires,
            self.sign(object_name, expires)
        );
        Ok(SignedUrl { url, expires_at })
    }
}
