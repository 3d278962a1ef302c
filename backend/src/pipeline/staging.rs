use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const MAX_NAME_LEN: usize = 100;
const FALLBACK_NAME: &str = "upload";

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("failed to write staged file: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("upload stream failed: {0}")]
    Payload(String),
}

/// Local directory where uploads are written before processing.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
    max_bytes: usize,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, max_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Streams `chunks` into a fresh uniquely-named file. The returned guard
    /// owns the file; a partially written file is removed on failure.
    pub async fn stage<S, B, E>(
        &self,
        original_name: &str,
        mut chunks: S,
    ) -> Result<StagedFile, StagingError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let object_name = format!("{}_{}", Uuid::new_v4(), sanitize_file_name(original_name));
        let mut staged = StagedFile {
            path: self.dir.join(&object_name),
            object_name,
            original_name: original_name.to_string(),
            len: 0,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged.path)
            .await?;

        let mut written = 0usize;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| StagingError::Payload(e.to_string()))?;
            let bytes = chunk.as_ref();
            written += bytes.len();
            if written > self.max_bytes {
                return Err(StagingError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            file.write_all(bytes).await?;
        }
        file.flush().await?;
        staged.len = written;

        log::debug!("Staged {} ({} bytes)", staged.path.display(), written);
        Ok(staged)
    }
}

/// An upload on local disk, deleted when the guard is dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    object_name: String,
    original_name: String,
    len: usize,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Bytes written.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed staged file {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Failed to remove staged file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Reduces a client-supplied filename to a safe single path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    // Keep the extension when truncating, storage picks the content type from it.
    let cleaned = if cleaned.len() > MAX_NAME_LEN {
        match cleaned.rsplit_once('.') {
            Some((stem, ext)) if ext.len() < 10 => {
                format!("{}.{}", &stem[..MAX_NAME_LEN - ext.len() - 1], ext)
            }
            _ => cleaned[..MAX_NAME_LEN].to_string(),
        }
    } else {
        cleaned.to_string()
    };

    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}
