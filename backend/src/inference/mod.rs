pub mod labels;
pub mod model;
pub mod preprocess;

pub use labels::{LabelSet, LabelSetError};
pub use model::{Classification, Classifier, InferenceError};
pub use preprocess::{ImagePreprocessor, PreprocessError};
