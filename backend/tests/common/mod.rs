#![allow(dead_code)]

use actix_web::web;
use async_trait::async_trait;
use dermascan_backend::history::{HistoryLedger, JsonFileLedger};
use dermascan_backend::inference::{Classifier, ImagePreprocessor, InferenceError, LabelSet};
use dermascan_backend::pipeline::{Predictor, StagingArea};
use dermascan_backend::storage::object_store::expiry_from_now;
use dermascan_backend::storage::{ObjectStore, ObjectStoreError, SignedUrl};
use futures::channel::oneshot;
use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use shared::ClassLabel;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const IMAGE_SIZE: u32 = 16;
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024;

/// Classifier returning the same distribution for every input.
pub struct FixedClassifier {
    labels: LabelSet,
    scores: Option<Vec<f32>>,
}

impl FixedClassifier {
    /// `probability` on `label`, the rest spread evenly over the other labels.
    pub fn predicting(label: ClassLabel, probability: f32) -> Self {
        let labels = LabelSet::default();
        let rest = (1.0 - probability) / (labels.len() - 1) as f32;
        let scores = (0..labels.len())
            .map(|i| {
                if labels.get(i) == Some(label) {
                    probability
                } else {
                    rest
                }
            })
            .collect();
        Self {
            labels,
            scores: Some(scores),
        }
    }

    pub fn broken() -> Self {
        Self {
            labels: LabelSet::default(),
            scores: None,
        }
    }
}

impl Classifier for FixedClassifier {
    fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn scores(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let side = IMAGE_SIZE as usize;
        assert_eq!(input.shape(), &[1, side, side, 3]);
        self.scores
            .clone()
            .ok_or_else(|| InferenceError::Runtime("simulated engine fault".into()))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail: bool,
    entered: Mutex<Option<oneshot::Sender<()>>>,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Store whose uploads never finish; `entered` fires once an upload starts.
    pub fn hanging(entered: oneshot::Sender<()>) -> Self {
        Self {
            entered: Mutex::new(Some(entered)),
            ..Self::default()
        }
    }

    pub fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn url_ttl(&self) -> Duration {
        Duration::from_secs(3600)
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        object_name: &str,
    ) -> Result<(), ObjectStoreError> {
        let entered = self.entered.lock().unwrap().take();
        if let Some(entered) = entered {
            let _ = entered.send(());
            futures::future::pending::<()>().await;
        }
        if self.fail {
            return Err(ObjectStoreError::S3("simulated outage".into()));
        }
        let bytes = tokio::fs::read(local_path).await?;
        self.objects
            .lock()
            .unwrap()
            .insert(object_name.to_string(), bytes);
        Ok(())
    }

    async fn signed_url(
        &self,
        object_name: &str,
        ttl: Duration,
    ) -> Result<SignedUrl, ObjectStoreError> {
        Ok(SignedUrl {
            url: format!(
                "https://storage.test/{}?ttl={}",
                object_name,
                ttl.as_secs()
            ),
            expires_at: expiry_from_now(ttl)?,
        })
    }
}

pub struct TestContext {
    pub dir: TempDir,
    pub history_path: PathBuf,
    pub predictor: web::Data<Predictor>,
}

impl TestContext {
    pub fn new(classifier: FixedClassifier, store: Arc<dyn ObjectStore>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let history_path = dir.path().join("prediction_history.json");
        let ledger: Arc<dyn HistoryLedger> = Arc::new(JsonFileLedger::new(&history_path));
        let staging = StagingArea::new(dir.path().join("uploads"), MAX_UPLOAD_BYTES).unwrap();
        let predictor = Predictor::new(
            staging,
            ImagePreprocessor::new(IMAGE_SIZE),
            Arc::new(classifier),
            store,
            ledger,
        );
        Self {
            dir,
            history_path,
            predictor: web::Data::new(predictor),
        }
    }

    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.predictor.staging().dir())
            .unwrap()
            .count()
    }

    pub async fn history_len(&self) -> Option<usize> {
        self.predictor
            .history()
            .snapshot()
            .await
            .unwrap()
            .map(|entries| entries.len())
    }
}

pub fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 7) as u8, (y * 9) as u8, 120]));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub const BOUNDARY: &str = "dermascan-test-boundary";

/// Builds a one-field multipart body and its content type.
pub fn multipart(field: &str, file_name: Option<&str>, content: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            BOUNDARY, field
        )
        .as_bytes(),
    );
    if let Some(name) = file_name {
        body.extend_from_slice(format!("; filename=\"{}\"", name).as_bytes());
    }
    body.extend_from_slice(b"\r\nContent-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}
