use async_trait::async_trait;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use shared::PredictionResult;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("history I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("history document is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("failed to serialize history: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// Append-only record of past predictions.
#[async_trait]
pub trait HistoryLedger: Send + Sync {
    /// Adds one entry at the end. Concurrent appends never lose entries.
    async fn append(&self, entry: &PredictionResult) -> Result<(), LedgerError>;

    /// Every entry in append order, or `None` if nothing was ever written.
    async fn snapshot(&self) -> Result<Option<Vec<PredictionResult>>, LedgerError>;

    async fn read_all(&self) -> Result<Vec<PredictionResult>, LedgerError> {
        Ok(self.snapshot().await?.unwrap_or_default())
    }
}

/// Ledger kept as a single JSON array document, rewritten on every append.
pub struct JsonFileLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn load(&self) -> Result<Option<Vec<PredictionResult>>, LedgerError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let entries = serde_json::from_slice(&raw).map_err(LedgerError::Corrupt)?;
        Ok(Some(entries))
    }

    async fn persist(&self, entries: &[PredictionResult]) -> Result<(), LedgerError> {
        let mut document = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut document, formatter);
        entries
            .serialize(&mut serializer)
            .map_err(LedgerError::Serialization)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        // Readers see either the old or the new document, never a partial one.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let written = match tokio::fs::write(&tmp, &document).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    log::warn!("Failed to remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(self.io_error(e));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryLedger for JsonFileLedger {
    async fn append(&self, entry: &PredictionResult) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?.unwrap_or_default();
        entries.push(entry.clone());
        self.persist(&entries).await?;
        log::debug!(
            "History now holds {} entries ({})",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn snapshot(&self) -> Result<Option<Vec<PredictionResult>>, LedgerError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }
}
