use ndarray::Array4;
use shared::{ClassLabel, Confidence};
use std::sync::{Mutex, MutexGuard};

use super::labels::LabelSet;

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("model produced {got} scores for {expected} labels")]
    ShapeMismatch { expected: usize, got: usize },
    #[error("model produced a non-finite score at index {0}")]
    NonFinite(usize),
    #[error("model runtime error: {0}")]
    Runtime(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: ClassLabel,
    pub probability: f32,
}

impl Classification {
    pub fn confidence(&self) -> Confidence {
        Confidence::from_probability(self.probability)
    }
}

/// Model runtime shared by every request handler.
///
/// Implementations must be callable from several threads at once; engines
/// that are not reentrant serialise calls internally.
pub trait Classifier: Send + Sync {
    fn labels(&self) -> &LabelSet;

    /// Raw per-label scores for a `[1, size, size, 3]` input.
    fn scores(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError>;

    fn classify(&self, input: &Array4<f32>) -> Result<Classification, InferenceError> {
        let scores = self.scores(input)?;
        let labels = self.labels();
        if scores.len() != labels.len() {
            return Err(InferenceError::ShapeMismatch {
                expected: labels.len(),
                got: scores.len(),
            });
        }

        let (index, probability) = argmax(&scores)?;
        let label = labels.get(index).ok_or(InferenceError::ShapeMismatch {
            expected: labels.len(),
            got: scores.len(),
        })?;
        Ok(Classification {
            label,
            probability: probability.clamp(0.0, 1.0),
        })
    }
}

fn argmax(scores: &[f32]) -> Result<(usize, f32), InferenceError> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if !score.is_finite() {
            return Err(InferenceError::NonFinite(index));
        }
        // First maximum wins on ties.
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best.ok_or(InferenceError::ShapeMismatch {
        expected: 1,
        got: 0,
    })
}

/// Locks an engine that keeps no state across calls, so a panic in an earlier
/// call leaves nothing to repair.
#[cfg_attr(not(feature = "torch"), allow(dead_code))]
pub(crate) fn lock_engine<T>(engine: &Mutex<T>) -> MutexGuard<'_, T> {
    engine.lock().unwrap_or_else(|poisoned| {
        log::warn!("Recovering model lock after a panicked forward pass");
        poisoned.into_inner()
    })
}

#[cfg(feature = "torch")]
pub use torch::TorchModel;

#[cfg(feature = "torch")]
mod torch {
    use super::{Classifier, InferenceError, lock_engine};
    use crate::config::TensorLayout;
    use crate::inference::labels::LabelSet;
    use ndarray::Array4;
    use std::path::Path;
    use std::sync::Mutex;
    use tch::{CModule, Device, Kind, Tensor};

    /// TorchScript classifier. Forward passes are serialised by `module`'s lock.
    pub struct TorchModel {
        module: Mutex<CModule>,
        device: Device,
        labels: LabelSet,
        layout: TensorLayout,
        apply_softmax: bool,
    }

    impl TorchModel {
        pub fn load(
            model_path: &Path,
            labels: LabelSet,
            layout: TensorLayout,
            apply_softmax: bool,
        ) -> Result<Self, InferenceError> {
            let device = Device::cuda_if_available();
            let module = CModule::load_on_device(model_path, device)
                .map_err(|e| InferenceError::Runtime(e.to_string()))?;
            log::info!(
                "Loaded model {} on {:?} with {} labels",
                model_path.display(),
                device,
                labels.len()
            );
            Ok(Self {
                module: Mutex::new(module),
                device,
                labels,
                layout,
                apply_softmax,
            })
        }

        fn to_tensor(&self, input: &Array4<f32>) -> Result<Tensor, InferenceError> {
            let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
            let contiguous = input.as_standard_layout();
            let data = contiguous
                .as_slice()
                .ok_or_else(|| InferenceError::Runtime("input tensor is not contiguous".into()))?;
            let tensor = Tensor::from_slice(data).view(shape.as_slice());
            let tensor = match self.layout {
                TensorLayout::Nhwc => tensor,
                TensorLayout::Nchw => tensor.permute([0, 3, 1, 2]).contiguous(),
            };
            Ok(tensor.to_device(self.device))
        }
    }

    impl Classifier for TorchModel {
        fn labels(&self) -> &LabelSet {
            &self.labels
        }

        fn scores(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
            let tensor = self.to_tensor(input)?;
            let output = {
                let module = lock_engine(&self.module);
                tch::no_grad(|| module.forward_ts(&[&tensor]))
                    .map_err(|e| InferenceError::Runtime(e.to_string()))?
            };
            let output = if self.apply_softmax {
                output.softmax(-1, Kind::Float)
            } else {
                output.to_kind(Kind::Float)
            };
            let flat = output.to_device(Device::Cpu).view([-1]);
            Vec::<f32>::try_from(&flat).map_err(|e| InferenceError::Runtime(e.to_string()))
        }
    }
}
