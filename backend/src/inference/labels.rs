use shared::ClassLabel;
use std::collections::HashSet;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LabelSetError {
    #[error("unknown label: {0}")]
    Unknown(String),
    #[error("duplicate label: {0}")]
    Duplicate(ClassLabel),
    #[error("label set is empty")]
    Empty,
}

/// Maps the classifier's output positions to labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSet {
    labels: Vec<ClassLabel>,
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            labels: ClassLabel::reference_order(),
        }
    }
}

impl LabelSet {
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, LabelSetError> {
        if names.is_empty() {
            return Err(LabelSetError::Empty);
        }

        let mut seen = HashSet::new();
        let mut labels = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            let label =
                ClassLabel::from_str(name).map_err(|_| LabelSetError::Unknown(name.to_string()))?;
            if !seen.insert(label) {
                return Err(LabelSetError::Duplicate(label));
            }
            labels.push(label);
        }
        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<ClassLabel> {
        self.labels.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
