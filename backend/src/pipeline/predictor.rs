use actix_web::web;
use futures::Stream;
use log::{error, info, warn};
use shared::PredictionResult;
use std::fmt::{self, Display};
use std::sync::Arc;

use super::staging::{StagedFile, StagingArea, StagingError};
use crate::history::{HistoryLedger, LedgerError};
use crate::inference::{Classifier, ImagePreprocessor, InferenceError, PreprocessError};
use crate::storage::{ObjectStore, ObjectStoreError};

/// Pipeline step a request was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Receive,
    Staging,
    Preprocess,
    Inference,
    Upload,
    Record,
}

impl Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Receive => "receive",
            Stage::Staging => "staging",
            Stage::Preprocess => "preprocess",
            Stage::Inference => "inference",
            Stage::Upload => "upload",
            Stage::Record => "record",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("No image file provided")]
    MissingInput,
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error("failed to decode image: {0}")]
    Decode(#[from] PreprocessError),
    #[error("inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("upload failed: {0}")]
    Upload(#[from] ObjectStoreError),
    #[error("failed to record prediction: {0}")]
    Ledger(#[from] LedgerError),
    #[error("worker pool unavailable during {0}")]
    Blocking(Stage),
}

impl PredictionError {
    pub fn stage(&self) -> Stage {
        match self {
            PredictionError::MissingInput => Stage::Receive,
            PredictionError::Staging(_) => Stage::Staging,
            PredictionError::Decode(_) => Stage::Preprocess,
            PredictionError::Inference(_) => Stage::Inference,
            PredictionError::Upload(_) => Stage::Upload,
            PredictionError::Ledger(_) => Stage::Record,
            PredictionError::Blocking(stage) => *stage,
        }
    }

    /// Caused by the request rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PredictionError::MissingInput
                | PredictionError::Staging(StagingError::TooLarge { .. })
                | PredictionError::Staging(StagingError::Payload(_))
        )
    }

    /// Message safe to return to the caller. Internal causes stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            PredictionError::MissingInput => "No image file provided".to_string(),
            PredictionError::Staging(StagingError::TooLarge { limit }) => {
                format!("Image exceeds the {} byte upload limit", limit)
            }
            PredictionError::Staging(StagingError::Payload(_)) => {
                "Malformed upload payload".to_string()
            }
            _ => "Failed to process the image".to_string(),
        }
    }

    fn log(&self) {
        if self.is_client_error() {
            warn!("Prediction rejected at {}: {}", self.stage(), self);
        } else {
            error!("Prediction failed at {}: {}", self.stage(), self);
        }
    }
}

/// Runs an upload through staging, preprocessing, inference, storage and
/// history. Collaborators are injected so each can be replaced independently.
pub struct Predictor {
    staging: StagingArea,
    preprocessor: ImagePreprocessor,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn ObjectStore>,
    ledger: Arc<dyn HistoryLedger>,
}

impl Predictor {
    pub fn new(
        staging: StagingArea,
        preprocessor: ImagePreprocessor,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn ObjectStore>,
        ledger: Arc<dyn HistoryLedger>,
    ) -> Self {
        Self {
            staging,
            preprocessor,
            classifier,
            store,
            ledger,
        }
    }

    pub fn history(&self) -> &dyn HistoryLedger {
        self.ledger.as_ref()
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Writes the upload to a uniquely named local file.
    pub async fn stage<S, B, E>(
        &self,
        original_name: &str,
        chunks: S,
    ) -> Result<StagedFile, PredictionError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        self.staging
            .stage(original_name, chunks)
            .await
            .map_err(|e| {
                let e = PredictionError::from(e);
                e.log();
                e
            })
    }

    /// Classifies, stores and records a staged upload. The staged file is
    /// consumed and removed before this returns, whatever the outcome.
    pub async fn predict(
        &self,
        staged: Option<StagedFile>,
    ) -> Result<PredictionResult, PredictionError> {
        // A zero-byte part carries no image either.
        let Some(staged) = staged.filter(|file| !file.is_empty()) else {
            let e = PredictionError::MissingInput;
            e.log();
            return Err(e);
        };

        let outcome = self.run(&staged).await;
        drop(staged);

        match &outcome {
            Ok(result) => info!(
                "Predicted {} ({}) for {}",
                result.label, result.confidence, result.original_file_name
            ),
            Err(e) => e.log(),
        }
        outcome
    }

    async fn run(&self, staged: &StagedFile) -> Result<PredictionResult, PredictionError> {
        let preprocessor = self.preprocessor;
        let path = staged.path().to_path_buf();
        let tensor = web::block(move || preprocessor.prepare(&path))
            .await
            .map_err(|_| PredictionError::Blocking(Stage::Preprocess))??;

        let classifier = Arc::clone(&self.classifier);
        let classification = web::block(move || classifier.classify(&tensor))
            .await
            .map_err(|_| PredictionError::Blocking(Stage::Inference))??;

        let signed = self
            .store
            .upload(staged.path(), staged.object_name())
            .await?;
        info!(
            "Stored {} (URL valid until {})",
            staged.object_name(),
            signed.expires_at.to_rfc3339()
        );

        let result = PredictionResult {
            original_file_name: staged.original_name().to_string(),
            image_url: signed.url,
            label: classification.label,
            confidence: classification.confidence(),
        };
        self.ledger.append(&result).await.inspect_err(|_| {
            warn!(
                "Object {} was stored but its prediction was not recorded",
                staged.object_name()
            )
        })?;
        Ok(result)
    }
}
